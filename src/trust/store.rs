//! Device-level `TrustRelationship` records: persisted and queried reverse-
//! indexed by peer.

use std::sync::{Arc, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::audit::{AuditEvent, AuditEventType, AuditLog};
use crate::error::Result;
use crate::ports::{ObjectStorePort, StoredObject};
use crate::types::{RelationshipTrustLevel, TrustStatus};

const COLLECTION: &str = "trust_relationships";

/// A device/peer-level trust record keyed by the peer's identity hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrustRelationship {
    pub peer: String,
    pub peer_public_key: String,
    pub status: TrustStatus,
    pub trust_level: Option<RelationshipTrustLevel>,
    pub permissions: Value,
    pub established_at: DateTime<Utc>,
    pub last_verified: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub context: Option<String>,
    pub verification_method: Option<String>,
    pub verification_proof: Option<String>,
    pub version: u64,
}

/// Options accepted by `TrustStore::set_trust_status`, beyond the required
/// peer/public key/status triple.
#[derive(Debug, Clone, Default)]
pub struct TrustStatusOptions {
    pub trust_level: Option<RelationshipTrustLevel>,
    pub permissions: Option<Value>,
    pub valid_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub context: Option<String>,
    pub verification_method: Option<String>,
    pub verification_proof: Option<String>,
}

/// Emitted whenever a peer's trust status changes.
#[derive(Debug, Clone)]
pub struct TrustChanged {
    pub peer: String,
    pub status: TrustStatus,
}

/// Persists and queries `TrustRelationship` versioned objects.
pub struct TrustStore {
    store: Arc<dyn ObjectStorePort>,
    audit: Arc<AuditLog>,
    change_tx: StdRwLock<Option<mpsc::UnboundedSender<TrustChanged>>>,
}

impl TrustStore {
    /// Wrap an `ObjectStorePort` for trust-relationship persistence.
    pub fn new(store: Arc<dyn ObjectStorePort>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit, change_tx: StdRwLock::new(None) }
    }

    /// Subscribe to `TrustChanged` notifications.
    pub fn on_change(&self, tx: mpsc::UnboundedSender<TrustChanged>) {
        *self.change_tx.write().expect("trust store lock poisoned") = Some(tx);
    }

    /// The current stored relationship for `peer`, if any.
    pub async fn get(&self, peer: &str) -> Result<Option<TrustRelationship>> {
        match self.store.latest(COLLECTION, peer).await? {
            Some(object) => Ok(Some(serde_json::from_value(object.value)?)),
            None => Ok(None),
        }
    }

    /// Every stored version for `peer`, in increasing version order.
    pub async fn history(&self, peer: &str) -> Result<Vec<TrustRelationship>> {
        let objects = self.store.history(COLLECTION, peer).await?;
        objects
            .into_iter()
            .map(|o| serde_json::from_value(o.value).map_err(crate::error::CaError::from))
            .collect()
    }

    /// Every known peer with at least one stored relationship.
    pub async fn list_peers(&self) -> Result<Vec<String>> {
        self.store.list_ids(COLLECTION).await
    }

    /// Create a new version of `peer`'s relationship with `status`,
    /// preserving `established_at` from any existing relationship and
    /// always refreshing `last_verified`.
    pub async fn set_trust_status(
        &self,
        peer: &str,
        peer_public_key: &str,
        status: TrustStatus,
        opts: TrustStatusOptions,
    ) -> Result<TrustRelationship> {
        let existing = self.get(peer).await?;
        let now = Utc::now();

        let relationship = TrustRelationship {
            peer: peer.to_string(),
            peer_public_key: peer_public_key.to_string(),
            status,
            trust_level: opts.trust_level.or_else(|| existing.as_ref().and_then(|e| e.trust_level)),
            permissions: opts.permissions.unwrap_or_else(|| existing.as_ref().map(|e| e.permissions.clone()).unwrap_or(Value::Object(Default::default()))),
            established_at: existing.as_ref().map(|e| e.established_at).unwrap_or(now),
            last_verified: now,
            valid_until: opts.valid_until.or_else(|| existing.as_ref().and_then(|e| e.valid_until)),
            reason: opts.reason,
            context: opts.context.or_else(|| existing.as_ref().and_then(|e| e.context.clone())),
            verification_method: opts.verification_method.or_else(|| existing.as_ref().and_then(|e| e.verification_method.clone())),
            verification_proof: opts.verification_proof,
            version: existing.as_ref().map(|e| e.version + 1).unwrap_or(1),
        };

        let value = serde_json::to_value(&relationship)?;
        self.store
            .put_version(COLLECTION, peer, StoredObject { version: relationship.version, value })
            .await?;

        let event_type = if relationship.status == TrustStatus::Revoked {
            AuditEventType::TrustRevoked
        } else {
            AuditEventType::TrustEstablished
        };
        let mut event = AuditEvent::new(event_type, peer).with_subject(peer);
        if let Some(reason) = &relationship.reason {
            event = event.with_reason(reason.clone());
        }
        self.audit.record(event);

        info!(peer, status = ?relationship.status, "trust status updated");
        if let Some(tx) = self.change_tx.read().expect("trust store lock poisoned").clone() {
            let _ = tx.send(TrustChanged { peer: peer.to_string(), status: relationship.status });
        }

        Ok(relationship)
    }
}
