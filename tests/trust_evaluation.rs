//! Multi-factor trust evaluation, path finding, and social graph summaries.

use std::sync::Arc;

use serde_json::json;

use one_trust_ca::adapters::{MemoryKeychain, MemoryObjectStore};
use one_trust_ca::audit::AuditLog;
use one_trust_ca::ca::{CaEngine, IssueRequest};
use one_trust_ca::config::CaConfig;
use one_trust_ca::error::Result;
use one_trust_ca::trust::graph::{evaluate_trust, CaDeviceTrustVerifier, DeviceTrustVerifier, EdgeGraph, TrustEdge};
use one_trust_ca::trust::store::{TrustStatusOptions, TrustStore};
use one_trust_ca::types::{CertKind, EdgeLevel, TrustContext, TrustStatus};
use async_trait::async_trait;

struct AlwaysVerifies;

#[async_trait]
impl DeviceTrustVerifier for AlwaysVerifies {
    async fn verifies(&self, _peer: &str, _public_key: &str) -> Result<bool> {
        Ok(true)
    }
}

struct NeverVerifies;

#[async_trait]
impl DeviceTrustVerifier for NeverVerifies {
    async fn verifies(&self, _peer: &str, _public_key: &str) -> Result<bool> {
        Ok(false)
    }
}

/// P7 — `evaluate_trust` always returns level and confidence in [0, 1],
/// across every status and verifier outcome.
#[tokio::test]
async fn evaluated_trust_stays_within_unit_bounds() {
    let store = TrustStore::new(Arc::new(MemoryObjectStore::new()), Arc::new(AuditLog::new()));
    for status in [TrustStatus::Trusted, TrustStatus::Pending, TrustStatus::Untrusted, TrustStatus::Revoked] {
        store.set_trust_status("peer", "aa".repeat(32).as_str(), status, TrustStatusOptions::default()).await.unwrap();
        for verifier in [Some(&AlwaysVerifies as &dyn DeviceTrustVerifier), Some(&NeverVerifies), None] {
            let result = evaluate_trust(&store, "peer", TrustContext::General, verifier, &CaConfig::default()).await.unwrap();
            assert!((0.0..=1.0).contains(&result.level), "level out of bounds: {}", result.level);
            assert!((0.0..=1.0).contains(&result.confidence), "confidence out of bounds: {}", result.confidence);
        }
    }
}

/// A verified device-trust chain raises confidence; a failed lookup lowers it.
#[tokio::test]
async fn device_trust_verification_shifts_confidence_in_the_documented_direction() {
    let store = TrustStore::new(Arc::new(MemoryObjectStore::new()), Arc::new(AuditLog::new()));
    store.set_trust_status("peer", "aa".repeat(32).as_str(), TrustStatus::Trusted, TrustStatusOptions::default()).await.unwrap();

    let verified = evaluate_trust(&store, "peer", TrustContext::General, Some(&AlwaysVerifies), &CaConfig::default()).await.unwrap();
    let unverified = evaluate_trust(&store, "peer", TrustContext::General, Some(&NeverVerifies), &CaConfig::default()).await.unwrap();
    assert!(verified.confidence > unverified.confidence);
}

/// Context thresholds: file-transfer is the strictest, general accepts
/// anything.
#[tokio::test]
async fn context_thresholds_gate_file_transfer_more_strictly_than_general() {
    let store = TrustStore::new(Arc::new(MemoryObjectStore::new()), Arc::new(AuditLog::new()));
    store.set_trust_status("peer", "aa".repeat(32).as_str(), TrustStatus::Untrusted, TrustStatusOptions::default()).await.unwrap();

    let file_transfer = evaluate_trust(&store, "peer", TrustContext::FileTransfer, None, &CaConfig::default()).await.unwrap();
    let general = evaluate_trust(&store, "peer", TrustContext::General, None, &CaConfig::default()).await.unwrap();
    assert_eq!(file_transfer.reason, "insufficient_trust_for_file_transfer");
    assert_eq!(general.reason, "ok");
}

/// An expired relationship always evaluates to zero trust, full confidence.
#[tokio::test]
async fn expired_relationship_evaluates_to_zero_trust() {
    let store = TrustStore::new(Arc::new(MemoryObjectStore::new()), Arc::new(AuditLog::new()));
    store
        .set_trust_status(
            "peer",
            "aa".repeat(32).as_str(),
            TrustStatus::Trusted,
            TrustStatusOptions { valid_until: Some(chrono::Utc::now() - chrono::Duration::days(1)), ..Default::default() },
        )
        .await
        .unwrap();
    let result = evaluate_trust(&store, "peer", TrustContext::General, None, &CaConfig::default()).await.unwrap();
    assert_eq!(result.level, 0.0);
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.reason, "expired");
}

/// `evaluate_trust` backed by a real `CaEngine`-issued device-trust
/// certificate raises confidence exactly the way a mock verifier does.
#[tokio::test]
async fn ca_backed_verifier_raises_confidence_for_a_live_device_certificate() {
    let keychain = Arc::new(MemoryKeychain::new());
    let ca_store = Arc::new(MemoryObjectStore::new());
    let audit = Arc::new(AuditLog::new());
    let engine = Arc::new(CaEngine::new(CaConfig::default(), keychain.clone(), ca_store, audit));
    engine.init("ca-instance").unwrap();
    engine.create_root(json!({})).await.unwrap();

    let device_key = keychain.generate_keypair("device-1").await.unwrap();
    engine
        .issue(IssueRequest {
            kind: CertKind::Device,
            subject: "device-1".to_string(),
            subject_public_key: Some(device_key.clone()),
            validity: "90 days".to_string(),
            valid_from: None,
            claims: json!({}),
            chain_to: None,
        })
        .await
        .unwrap();

    let trust_store = TrustStore::new(Arc::new(MemoryObjectStore::new()), Arc::new(AuditLog::new()));
    trust_store.set_trust_status("device-1", &device_key, TrustStatus::Trusted, TrustStatusOptions::default()).await.unwrap();

    let verifier = CaDeviceTrustVerifier::new(engine.clone());
    let result = evaluate_trust(&trust_store, "device-1", TrustContext::General, Some(&verifier), &CaConfig::default()).await.unwrap();
    let baseline = evaluate_trust(&trust_store, "device-1", TrustContext::General, None, &CaConfig::default()).await.unwrap();
    assert!(result.confidence > baseline.confidence);
}

/// P8 — the returned bottleneck is never worse than the minimum confidence
/// along the winning path, and a direct higher-confidence edge beats a
/// longer path to the same destination.
#[tokio::test]
async fn widest_path_search_prefers_the_higher_bottleneck_route() {
    let graph = EdgeGraph::new();
    graph.upsert_edge(TrustEdge::new("a", "b", EdgeLevel::Trusted, 0.9, "social"));
    graph.upsert_edge(TrustEdge::new("b", "c", EdgeLevel::Trusted, 0.6, "social"));
    graph.upsert_edge(TrustEdge::new("a", "c", EdgeLevel::Known, 0.8, "social"));

    let path = graph.calculate_trust_path("a", "c", 6).unwrap();
    assert_eq!(path.path, vec!["a", "c"]);
    assert_eq!(path.bottleneck, 0.8);
}

/// `calculate_trust_path` respects `max_depth` and returns `None` when no
/// path exists within it.
#[tokio::test]
async fn path_search_respects_max_depth() {
    let graph = EdgeGraph::new();
    graph.upsert_edge(TrustEdge::new("a", "b", EdgeLevel::Known, 0.8, "social"));
    graph.upsert_edge(TrustEdge::new("b", "c", EdgeLevel::Known, 0.8, "social"));
    graph.upsert_edge(TrustEdge::new("c", "d", EdgeLevel::Known, 0.8, "social"));

    assert!(graph.calculate_trust_path("a", "d", 2).is_none());
    assert!(graph.calculate_trust_path("a", "d", 3).is_some());
}

/// `build_social_graph` reports degree, a centrality proxy, and clusters
/// only over high-confidence (>= 0.7) edges.
#[tokio::test]
async fn social_graph_reports_degree_and_centrality() {
    let graph = EdgeGraph::new();
    graph.upsert_edge(TrustEdge::new("a", "b", EdgeLevel::Trusted, 0.9, "social"));
    graph.upsert_edge(TrustEdge::new("b", "c", EdgeLevel::Trusted, 0.9, "social"));

    let summary = graph.build_social_graph();
    assert_eq!(summary.degree.get("b").copied(), Some(2));
    assert!(summary.centrality.get("a").copied().unwrap_or(0) >= 1);
    assert_eq!(summary.clusters.len(), 1);
    assert!(summary.clusters[0].contains(&"a".to_string()));
    assert!(summary.clusters[0].contains(&"c".to_string()));
}
