//! Cross-instance propagation: export from one CA instance, import into
//! another, and reconcile repeated or stale imports by version.

use std::sync::Arc;

use serde_json::json;

use one_trust_ca::adapters::{MemoryKeychain, MemoryObjectStore, MemoryPeerTransport};
use one_trust_ca::audit::AuditLog;
use one_trust_ca::ca::{CaEngine, IssueRequest};
use one_trust_ca::config::CaConfig;
use one_trust_ca::error::CaError;
use one_trust_ca::propagation::PropagationService;
use one_trust_ca::types::CertKind;

struct Instance {
    engine: CaEngine,
    service: PropagationService,
}

async fn instance(keychain: Arc<MemoryKeychain>, identity: &str) -> Instance {
    let store = Arc::new(MemoryObjectStore::new());
    let transport = Arc::new(MemoryPeerTransport::new());
    let audit = Arc::new(AuditLog::new());
    let engine = CaEngine::new(CaConfig::default(), keychain.clone(), store.clone(), Arc::new(AuditLog::new()));
    engine.init(identity).unwrap();
    engine.create_root(json!({})).await.unwrap();
    let service = PropagationService::new(store, transport, keychain, audit);
    Instance { engine, service }
}

/// S6 — instance A issues and exports a certificate; instance B imports it.
/// A then extends it and re-exports; B imports the new version. Replaying
/// the first export into B a second time is rejected as stale.
#[tokio::test]
async fn cross_instance_import_reconciles_by_version() {
    let shared_keychain = Arc::new(MemoryKeychain::new());
    let a = instance(shared_keychain.clone(), "instance-a").await;
    let b = instance(shared_keychain.clone(), "instance-b").await;

    let subject_key = shared_keychain.generate_keypair("h_s").await.unwrap();
    let cert = a
        .engine
        .issue(IssueRequest {
            kind: CertKind::Identity,
            subject: "h_s".to_string(),
            subject_public_key: Some(subject_key),
            validity: "12 months".to_string(),
            valid_from: None,
            claims: json!({}),
            chain_to: None,
        })
        .await
        .unwrap();

    let exported_v1 = a.service.export_external(&a.engine, "instance-a", &cert.id, None, vec![]).await.unwrap();
    assert_eq!(exported_v1.version, 1);

    let imported_v1 = b.service.import_external(&b.engine, "instance-b", exported_v1.document.clone()).await.unwrap();
    assert_eq!(imported_v1.version, 1);
    assert!(imported_v1.verified);

    a.engine.extend(&cert.id, "6 months").await.unwrap();
    let exported_v2 = a.service.export_external(&a.engine, "instance-a", &cert.id, None, vec![]).await.unwrap();
    assert_eq!(exported_v2.version, 2);

    let imported_v2 = b.service.import_external(&b.engine, "instance-b", exported_v2.document).await.unwrap();
    assert_eq!(imported_v2.version, 2);

    // P9: importing an older version after a newer one is stored is stale.
    let err = b.service.import_external(&b.engine, "instance-b", exported_v1.document).await.unwrap_err();
    assert!(matches!(err, CaError::StaleOrDuplicate { existing_version: 2 }));
}

/// P9: importing the exact same document twice yields exactly one stored
/// version; the second call is rejected, not silently accepted.
#[tokio::test]
async fn reimporting_identical_document_is_rejected_not_duplicated() {
    let shared_keychain = Arc::new(MemoryKeychain::new());
    let a = instance(shared_keychain.clone(), "instance-a").await;
    let b = instance(shared_keychain.clone(), "instance-b").await;

    let subject_key = shared_keychain.generate_keypair("h_s2").await.unwrap();
    let cert = a
        .engine
        .issue(IssueRequest {
            kind: CertKind::Identity,
            subject: "h_s2".to_string(),
            subject_public_key: Some(subject_key),
            validity: "12 months".to_string(),
            valid_from: None,
            claims: json!({}),
            chain_to: None,
        })
        .await
        .unwrap();
    let exported = a.service.export_external(&a.engine, "instance-a", &cert.id, None, vec![]).await.unwrap();

    b.service.import_external(&b.engine, "instance-b", exported.document.clone()).await.unwrap();
    let err = b.service.import_external(&b.engine, "instance-b", exported.document).await.unwrap_err();
    assert!(matches!(err, CaError::StaleOrDuplicate { existing_version: 1 }));

    let history = b.engine.history(&cert.id).await.unwrap();
    assert_eq!(history.len(), 1);
}

/// Revocations propagate internally as urgent: the background loop's status
/// reaches `Synced` for a revoked certificate just like any other version.
#[tokio::test]
async fn revocation_propagates_internally_with_urgent_priority() {
    use tokio::sync::mpsc;

    let keychain = Arc::new(MemoryKeychain::new());
    let store = Arc::new(MemoryObjectStore::new());
    let transport = Arc::new(MemoryPeerTransport::new());
    let audit = Arc::new(AuditLog::new());
    let engine = CaEngine::new(CaConfig::default(), keychain.clone(), store.clone(), Arc::new(AuditLog::new()));
    engine.init("instance-a").unwrap();
    engine.create_root(json!({})).await.unwrap();
    let service = Arc::new(PropagationService::new(store, transport.clone(), keychain.clone(), audit));

    let (tx, rx) = mpsc::unbounded_channel();
    engine.with_propagation_channel(tx);
    let runner = tokio::spawn(service.clone().run(rx));

    let subject_key = keychain.generate_keypair("h_s3").await.unwrap();
    let cert = engine
        .issue(IssueRequest {
            kind: CertKind::Identity,
            subject: "h_s3".to_string(),
            subject_public_key: Some(subject_key),
            validity: "12 months".to_string(),
            valid_from: None,
            claims: json!({}),
            chain_to: None,
        })
        .await
        .unwrap();
    engine.revoke(&cert.id, "compromised").await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let deliveries = transport.deliveries();
    assert!(deliveries.iter().any(|(_, id, _, urgent)| id == &cert.id && *urgent));
    runner.abort();
}
