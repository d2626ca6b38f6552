//! The social trust graph: directed `TrustEdge`s between persons, path
//! finding, multi-factor trust evaluation, and graph-level summaries.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ca::CaEngine;
use crate::config::CaConfig;
use crate::error::Result;
use crate::trust::store::TrustStore;
use crate::types::{CertKind, EdgeLevel, RelationshipTrustLevel, TrustContext, TrustStatus};

/// A directed social trust relation between two persons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrustEdge {
    pub from: String,
    pub to: String,
    pub level: EdgeLevel,
    pub confidence: f64,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub chain_depth: u32,
    pub path_trust: f64,
    pub interactions: u32,
    pub endorsements: u32,
    pub disputes: u32,
    pub scope: Option<String>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TrustEdge {
    /// A freshly created edge with zeroed counters and full path trust.
    pub fn new(from: impl Into<String>, to: impl Into<String>, level: EdgeLevel, confidence: f64, origin: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            level,
            confidence: confidence.clamp(0.0, 1.0),
            origin: origin.into(),
            created_at: Utc::now(),
            chain_depth: 0,
            path_trust: confidence.clamp(0.0, 1.0),
            interactions: 0,
            endorsements: 0,
            disputes: 0,
            scope: None,
            revoked: false,
            revoked_at: None,
        }
    }
}

/// The result of `evaluate_trust`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedTrust {
    pub level: f64,
    pub confidence: f64,
    pub reason: String,
    pub trust_level: Option<TrustStatus>,
}

/// A device-trust certificate chain check, injected so `evaluate_trust`
/// doesn't have to take a `CaEngine` directly — tests can supply a stub,
/// production wiring supplies `CaDeviceTrustVerifier`.
#[async_trait]
pub trait DeviceTrustVerifier: Send + Sync {
    /// Whether a verified device-trust certificate chain backs `public_key`
    /// for `peer`.
    async fn verifies(&self, peer: &str, public_key: &str) -> Result<bool>;
}

/// The production `DeviceTrustVerifier`: looks up `peer`'s device-trust
/// certificates in a live `CaEngine` and asks whether any of them, once
/// chain-verified, back `public_key`.
pub struct CaDeviceTrustVerifier {
    engine: Arc<CaEngine>,
}

impl CaDeviceTrustVerifier {
    /// Verify against `engine`'s certificate store.
    pub fn new(engine: Arc<CaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl DeviceTrustVerifier for CaDeviceTrustVerifier {
    async fn verifies(&self, peer: &str, public_key: &str) -> Result<bool> {
        let candidates = self.engine.find_by_subject(CertKind::Device, peer).await?;
        for cert in candidates {
            if cert.subject_public_key != public_key {
                continue;
            }
            let outcome = self.engine.verify_certificate(&cert).await?;
            if outcome.valid {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Evaluate multi-factor trust for `peer` under `context`, reading the
/// device-level relationship from `trust_store` and, if supplied, a
/// device-trust certificate chain via `verifier`. Context gate thresholds
/// come from `config` rather than being hardcoded, so a deployment can
/// tune how strict `file-transfer`/`communication` are without recompiling.
pub async fn evaluate_trust(
    trust_store: &TrustStore,
    peer: &str,
    context: TrustContext,
    verifier: Option<&dyn DeviceTrustVerifier>,
    config: &CaConfig,
) -> Result<EvaluatedTrust> {
    let Some(relationship) = trust_store.get(peer).await? else {
        return Ok(EvaluatedTrust {
            level: 0.0,
            confidence: 1.0,
            reason: "no_relationship".to_string(),
            trust_level: None,
        });
    };

    let now = Utc::now();
    if let Some(valid_until) = relationship.valid_until {
        if valid_until < now {
            return Ok(EvaluatedTrust {
                level: 0.0,
                confidence: 1.0,
                reason: "expired".to_string(),
                trust_level: Some(relationship.status),
            });
        }
    }

    let (mut level, mut confidence) = match relationship.status {
        TrustStatus::Trusted => (0.9, 0.5),
        TrustStatus::Pending => (0.3, 0.5),
        TrustStatus::Untrusted => (0.1, 0.8),
        TrustStatus::Revoked => (0.0, 1.0),
    };

    if let Some(verifier) = verifier {
        match verifier.verifies(peer, &relationship.peer_public_key).await {
            Ok(true) => confidence = (confidence + 0.2).min(1.0),
            Ok(false) | Err(_) => confidence = (confidence - 0.1).max(0.0),
        }
    }

    let age = now.signed_duration_since(relationship.last_verified);
    if age <= chrono::Duration::days(7) {
        confidence = (confidence + 0.1).min(1.0);
    } else if age > chrono::Duration::days(30) {
        confidence = (confidence - 0.1).max(0.0);
    }

    level = level.clamp(0.0, 1.0);
    confidence = confidence.clamp(0.0, 1.0);

    let reason = match context {
        TrustContext::FileTransfer if level < config.file_transfer_threshold => "insufficient_trust_for_file_transfer",
        TrustContext::Communication if level < config.communication_threshold => "insufficient_trust_for_communication",
        _ => "ok",
    };

    Ok(EvaluatedTrust { level, confidence, reason: reason.to_string(), trust_level: Some(relationship.status) })
}

/// A path found by `EdgeGraph::calculate_trust_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustPath {
    pub path: Vec<String>,
    pub path_length: usize,
    pub total_trust: f64,
    pub bottleneck: f64,
    pub is_valid: bool,
}

/// A node in `EdgeGraph::get_trust_chain`'s breadth-first tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChainNode {
    pub person: String,
    pub depth: u32,
    pub established_by: Option<String>,
    pub trust_level: RelationshipTrustLevel,
}

/// Collapse a social edge's strength onto the coarser, discrete levels a
/// trust chain reports: the root of the chain is always `SelfLevel`, every
/// other node's level follows from the edge that reached it.
fn edge_level_to_relationship_level(level: EdgeLevel) -> RelationshipTrustLevel {
    match level {
        EdgeLevel::Core | EdgeLevel::Trusted => RelationshipTrustLevel::High,
        EdgeLevel::Verified => RelationshipTrustLevel::Medium,
        EdgeLevel::Known | EdgeLevel::Invited => RelationshipTrustLevel::Low,
    }
}

/// Aggregate view produced by `EdgeGraph::build_social_graph`.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialGraphSummary {
    pub nodes: Vec<String>,
    pub edge_count: usize,
    pub degree: HashMap<String, usize>,
    pub centrality: HashMap<String, usize>,
    pub clusters: Vec<Vec<String>>,
}

/// In-memory directed trust graph. Edges are unversioned and bounded to what
/// this instance has observed; nothing here is persisted externally.
pub struct EdgeGraph {
    edges: RwLock<Vec<TrustEdge>>,
}

impl EdgeGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self { edges: RwLock::new(Vec::new()) }
    }

    /// Insert or replace the edge `from -> to` (edges are unversioned: a
    /// repeat insertion overwrites the prior edge between the same pair).
    pub fn upsert_edge(&self, edge: TrustEdge) {
        let mut edges = self.edges.write().expect("trust graph lock poisoned");
        edges.retain(|e| !(e.from == edge.from && e.to == edge.to));
        edges.push(edge);
    }

    /// Mark the edge `from -> to` revoked, if it exists.
    pub fn revoke_edge(&self, from: &str, to: &str) {
        let mut edges = self.edges.write().expect("trust graph lock poisoned");
        if let Some(edge) = edges.iter_mut().find(|e| e.from == from && e.to == to) {
            edge.revoked = true;
            edge.revoked_at = Some(Utc::now());
        }
    }

    /// Snapshot of every non-revoked edge.
    fn active_edges(&self) -> Vec<TrustEdge> {
        self.edges
            .read()
            .expect("trust graph lock poisoned")
            .iter()
            .filter(|e| !e.revoked)
            .cloned()
            .collect()
    }

    /// Find the widest (maximum-bottleneck) path from `from` to `to`, no
    /// longer than `max_depth` hops, aggregating edge confidence by taking
    /// the minimum along the path. Revoked edges are excluded.
    pub fn calculate_trust_path(&self, from: &str, to: &str, max_depth: usize) -> Option<TrustPath> {
        let edges = self.active_edges();
        let mut by_source: HashMap<&str, Vec<&TrustEdge>> = HashMap::new();
        for edge in &edges {
            by_source.entry(edge.from.as_str()).or_default().push(edge);
        }

        let mut best: Option<(Vec<String>, f64)> = None;

        // Exhaustive DFS: test graphs are small and max_depth is bounded, so
        // this stays cheap while guaranteeing the true widest path.
        fn dfs<'a>(
            current: &'a str,
            target: &str,
            by_source: &HashMap<&'a str, Vec<&'a TrustEdge>>,
            path: &mut Vec<String>,
            visited: &mut HashSet<String>,
            bottleneck: f64,
            depth: usize,
            max_depth: usize,
            best: &mut Option<(Vec<String>, f64)>,
        ) {
            if current == target && path.len() > 1 {
                if best.as_ref().map_or(true, |(_, b)| bottleneck > *b) {
                    *best = Some((path.clone(), bottleneck));
                }
                return;
            }
            if depth >= max_depth {
                return;
            }
            let Some(neighbors) = by_source.get(current) else { return };
            for edge in neighbors {
                if visited.contains(&edge.to) {
                    continue;
                }
                visited.insert(edge.to.clone());
                path.push(edge.to.clone());
                dfs(
                    &edge.to,
                    target,
                    by_source,
                    path,
                    visited,
                    bottleneck.min(edge.confidence),
                    depth + 1,
                    max_depth,
                    best,
                );
                path.pop();
                visited.remove(&edge.to);
            }
        }

        let mut path = vec![from.to_string()];
        let mut visited = HashSet::new();
        visited.insert(from.to_string());
        dfs(from, to, &by_source, &mut path, &mut visited, 1.0, 0, max_depth, &mut best);

        best.map(|(path, bottleneck)| {
            let total_trust = bottleneck;
            TrustPath {
                path_length: path.len() - 1,
                path,
                total_trust,
                bottleneck,
                is_valid: true,
            }
        })
    }

    /// Enumerate every active edge, compute per-node degree and a
    /// length-<=2 simple-path centrality proxy, and cluster nodes connected
    /// by edges with confidence >= 0.7.
    pub fn build_social_graph(&self) -> SocialGraphSummary {
        let edges = self.active_edges();
        let mut nodes: HashSet<String> = HashSet::new();
        for edge in &edges {
            nodes.insert(edge.from.clone());
            nodes.insert(edge.to.clone());
        }

        let mut degree: HashMap<String, usize> = HashMap::new();
        for node in &nodes {
            let count = edges.iter().filter(|e| e.from == *node || e.to == *node).count();
            degree.insert(node.clone(), count);
        }

        let mut by_source: HashMap<&str, Vec<&TrustEdge>> = HashMap::new();
        for edge in &edges {
            by_source.entry(edge.from.as_str()).or_default().push(edge);
        }

        let mut centrality: HashMap<String, usize> = HashMap::new();
        for node in &nodes {
            let mut count = 0;
            if let Some(direct) = by_source.get(node.as_str()) {
                count += direct.len();
                for edge in direct {
                    count += by_source.get(edge.to.as_str()).map_or(0, |v| v.len());
                }
            }
            centrality.insert(node.clone(), count);
        }

        // Connected components over the undirected closure of high-confidence edges.
        let strong_edges: Vec<&TrustEdge> = edges.iter().filter(|e| e.confidence >= 0.7).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &strong_edges {
            adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
            adjacency.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut clusters: Vec<Vec<String>> = Vec::new();
        for node in &nodes {
            if visited.contains(node) {
                continue;
            }
            if !adjacency.contains_key(node.as_str()) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(node.clone());
            visited.insert(node.clone());
            while let Some(current) = queue.pop_front() {
                component.push(current.clone());
                if let Some(neighbors) = adjacency.get(current.as_str()) {
                    for &neighbor in neighbors {
                        if !visited.contains(neighbor) {
                            visited.insert(neighbor.to_string());
                            queue.push_back(neighbor.to_string());
                        }
                    }
                }
            }
            component.sort();
            clusters.push(component);
        }

        let mut nodes: Vec<String> = nodes.into_iter().collect();
        nodes.sort();

        SocialGraphSummary { nodes, edge_count: edges.len(), degree, centrality, clusters }
    }

    /// A breadth-first tree of outgoing trust relationships rooted at
    /// `person`, bounded to `max_depth` hops.
    pub fn get_trust_chain(&self, person: &str, max_depth: u32) -> Vec<TrustChainNode> {
        let edges = self.active_edges();
        let mut by_source: HashMap<&str, Vec<&TrustEdge>> = HashMap::new();
        for edge in &edges {
            by_source.entry(edge.from.as_str()).or_default().push(edge);
        }

        let mut result = vec![TrustChainNode {
            person: person.to_string(),
            depth: 0,
            established_by: None,
            trust_level: RelationshipTrustLevel::SelfLevel,
        }];
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(person.to_string());

        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        queue.push_back((person.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(neighbors) = by_source.get(current.as_str()) else { continue };
            for edge in neighbors {
                if visited.contains(&edge.to) {
                    continue;
                }
                visited.insert(edge.to.clone());
                result.push(TrustChainNode {
                    person: edge.to.clone(),
                    depth: depth + 1,
                    established_by: Some(current.clone()),
                    trust_level: edge_level_to_relationship_level(edge.level),
                });
                queue.push_back((edge.to.clone(), depth + 1));
            }
        }

        result
    }
}

impl Default for EdgeGraph {
    fn default() -> Self {
        Self::new()
    }
}
