//! The CA engine: root lifecycle, issuance, version transitions, and chain
//! verification.

pub mod state;

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType, AuditLog};
use crate::canonical::{canonical_bytes, content_hash};
use crate::certificate::{generate_serial_number, parse_duration, Certificate, CertStatus};
use crate::config::CaConfig;
use crate::error::{CaError, Result};
use crate::ports::{KeychainPort, ObjectStorePort, PeerTransportPort, StoredObject};
use crate::types::CertKind;

pub use state::CaState;

const COLLECTION: &str = "certificates";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Inputs to `CaEngine::issue`.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub kind: CertKind,
    pub subject: String,
    pub subject_public_key: Option<String>,
    /// Duration string accepted by `parse_duration`
    pub validity: String,
    pub valid_from: Option<i64>,
    pub claims: Value,
    /// Id of the certificate this one chains to, if not a fresh depth-1 issuance
    pub chain_to: Option<String>,
}

/// A structured reason a certificate failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    Revoked,
    Suspended,
    NotYetValid,
    Expired,
    BadSignature,
}

impl VerificationFailure {
    /// Stable machine-readable code, matching the prose reasons in the
    /// error-handling section of the certificate lifecycle.
    pub fn code(&self) -> &'static str {
        match self {
            VerificationFailure::Revoked => "revoked",
            VerificationFailure::Suspended => "suspended",
            VerificationFailure::NotYetValid => "not_yet_valid",
            VerificationFailure::Expired => "expired",
            VerificationFailure::BadSignature => "bad_signature",
        }
    }
}

/// Result of `CaEngine::verify_certificate`.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub reason: Option<VerificationFailure>,
}

impl VerificationOutcome {
    fn valid() -> Self {
        Self { valid: true, reason: None }
    }

    fn invalid(reason: VerificationFailure) -> Self {
        Self { valid: false, reason: Some(reason) }
    }
}

/// Result of `CaEngine::verify_chain`.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub valid: bool,
    /// The chain from the certificate itself back to (attempted) root, inclusive
    pub chain: Vec<Certificate>,
    /// Index into `chain` where verification failed, if any
    pub failed_at: Option<usize>,
    pub reason: Option<String>,
}

/// A request to hand a freshly persisted version off to the propagation
/// service's internal sync queue.
#[derive(Debug, Clone)]
pub struct PropagationRequest {
    pub collection: String,
    pub id: String,
    pub version: u64,
    pub urgent: bool,
}

/// Root creation, issuance, version transitions, and chain verification for
/// one CA instance.
pub struct CaEngine {
    state: StdRwLock<CaState>,
    config: CaConfig,
    instance_identity: StdRwLock<Option<String>>,
    keychain: Arc<dyn KeychainPort>,
    store: Arc<dyn ObjectStorePort>,
    audit: Arc<AuditLog>,
    /// Caches the content-address of every version this engine has written,
    /// since the `ObjectStorePort` is addressed by id/version, not by hash.
    /// Bounded to what this instance itself has touched, per the
    /// instance-scoped-cache design constraint.
    content_index: StdRwLock<HashMap<String, (String, u64)>>,
    id_locks: StdRwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
    propagation_tx: StdRwLock<Option<mpsc::UnboundedSender<PropagationRequest>>>,
}

impl CaEngine {
    /// Build an engine in the `Uninitialised` state.
    pub fn new(
        config: CaConfig,
        keychain: Arc<dyn KeychainPort>,
        store: Arc<dyn ObjectStorePort>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            state: StdRwLock::new(CaState::Uninitialised),
            config,
            instance_identity: StdRwLock::new(None),
            keychain,
            store,
            audit,
            content_index: StdRwLock::new(HashMap::new()),
            id_locks: StdRwLock::new(HashMap::new()),
            propagation_tx: StdRwLock::new(None),
        }
    }

    /// Wire a channel the propagation service listens on for newly persisted
    /// versions. Optional: an engine with no channel attached simply doesn't
    /// notify anyone.
    pub fn with_propagation_channel(&self, tx: mpsc::UnboundedSender<PropagationRequest>) {
        *self.propagation_tx.write().expect("ca engine lock poisoned") = Some(tx);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaState {
        *self.state.read().expect("ca engine lock poisoned")
    }

    /// This instance's own identity hash, once `init` has run.
    pub fn instance_identity(&self) -> Option<String> {
        self.instance_identity.read().expect("ca engine lock poisoned").clone()
    }

    /// `init` transition: `Uninitialised -> Initialised`. Records the
    /// identity this instance will sign as; does not yet create a root.
    pub fn init(&self, instance_identity: impl Into<String>) -> Result<()> {
        let mut state = self.state.write().expect("ca engine lock poisoned");
        if *state != CaState::Uninitialised {
            return Err(CaError::NotReady(
                "init called outside the Uninitialised state".to_string(),
            ));
        }
        *self.instance_identity.write().expect("ca engine lock poisoned") = Some(instance_identity.into());
        *state = CaState::Initialised;
        Ok(())
    }

    /// `createRoot` transition: `Initialised -> CAReady`. Looks up any root
    /// certificate already authored by this instance; generates a
    /// self-signed one if none exists.
    pub async fn create_root(&self, claims: Value) -> Result<Certificate> {
        {
            let state = *self.state.read().expect("ca engine lock poisoned");
            if state == CaState::Uninitialised {
                return Err(CaError::NotReady("create_root called before init".to_string()));
            }
        }
        let identity = self
            .instance_identity()
            .ok_or_else(|| CaError::NotReady("instance identity not set".to_string()))?;
        let root_id = format!("cert:identity:{identity}:root");

        let root = if let Some(existing) = self.store.latest(COLLECTION, &root_id).await? {
            info!(identity, "loaded existing root certificate");
            let cert: Certificate = serde_json::from_value(existing.value)?;
            self.index_put(&cert)?;
            cert
        } else {
            let public_key = match self.keychain.public_key(&identity).await? {
                Some(key) => key,
                None => self.keychain.generate_keypair(&identity).await?,
            };
            let issued_at = now_ms();
            let valid_until = issued_at + parse_duration(&self.config.root_validity)?;

            let mut merged_claims = claims;
            if let Value::Object(map) = &mut merged_claims {
                map.entry("ca_name").or_insert_with(|| Value::String(self.config.ca_name.clone()));
                map.entry("domain").or_insert_with(|| Value::String(self.config.domain.clone()));
            }

            let mut cert = Certificate {
                id: root_id.clone(),
                kind: CertKind::Identity,
                status: CertStatus::Valid,
                subject: identity.clone(),
                subject_public_key: public_key.clone(),
                issuer: identity.clone(),
                issuer_public_key: public_key,
                valid_from: issued_at,
                valid_until,
                issued_by: None,
                chain_depth: 0,
                claims: merged_claims,
                issued_at,
                serial_number: generate_serial_number(issued_at),
                version: 1,
                revocation_reason: None,
                signature: None,
            };
            self.sign_certificate(&mut cert, &identity).await?;
            self.persist(&cert).await?;
            info!(identity, cert_id = %cert.id, "created new self-signed root certificate");
            self.audit.record(
                AuditEvent::new(AuditEventType::CertificateIssued, identity.clone())
                    .with_subject(identity.clone())
                    .with_certificate(cert.id.clone(), cert.version)
                    .with_reason("root"),
            );
            cert
        };

        *self.state.write().expect("ca engine lock poisoned") = CaState::CAReady;
        Ok(root)
    }

    /// `shutdown` transition: `* -> Uninitialised`. Clears the instance
    /// identity and any wired propagation channel; persisted certificates
    /// and audit history are untouched, so a subsequent `init` against the
    /// same identity reloads the existing root rather than minting a new one.
    pub fn shutdown(&self) {
        *self.state.write().expect("ca engine lock poisoned") = CaState::Uninitialised;
        *self.instance_identity.write().expect("ca engine lock poisoned") = None;
        *self.propagation_tx.write().expect("ca engine lock poisoned") = None;
    }

    fn require_ready(&self) -> Result<()> {
        if !self.state().is_ready() {
            return Err(CaError::NotReady(format!("CA is in state {:?}", self.state())));
        }
        Ok(())
    }

    async fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.id_locks.write().expect("ca engine lock poisoned");
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn index_put(&self, cert: &Certificate) -> Result<()> {
        let hash = content_hash(cert)?;
        self.content_index
            .write()
            .expect("ca engine lock poisoned")
            .insert(hash, (cert.id.clone(), cert.version));
        Ok(())
    }

    /// Resolve a content hash recorded in some certificate's `issued_by` to
    /// the parent certificate's *current* state.
    ///
    /// Chain verification always re-checks the parent's live status rather
    /// than the exact version it was at issuance time: a parent that gets
    /// revoked or reduced after a child was issued must break the child's
    /// chain, which only works if this looks up the latest version under the
    /// id the hash was originally recorded against.
    async fn resolve_by_hash(&self, hash: &str) -> Result<Option<Certificate>> {
        let target = self.content_index.read().expect("ca engine lock poisoned").get(hash).cloned();
        let Some((id, _version)) = target else {
            return Ok(None);
        };
        match self.store.latest(COLLECTION, &id).await? {
            Some(object) => Ok(Some(serde_json::from_value(object.value)?)),
            None => Ok(None),
        }
    }

    async fn sign_certificate(&self, cert: &mut Certificate, signer_identity: &str) -> Result<()> {
        let message = canonical_bytes(cert)?;
        let signature = self
            .keychain
            .sign(signer_identity, &message)
            .await
            .map_err(|e| CaError::SigningFailure(e.to_string()))?;
        cert.signature = Some(signature);
        Ok(())
    }

    async fn persist(&self, cert: &Certificate) -> Result<()> {
        let value = serde_json::to_value(cert)?;
        self.store
            .put_version(COLLECTION, &cert.id, StoredObject { version: cert.version, value })
            .await
            .map_err(|e| CaError::StoreFailure(e.to_string()))?;
        self.index_put(cert)?;
        self.notify_propagation(&cert.id, cert.version, cert.status == CertStatus::Revoked);
        Ok(())
    }

    fn notify_propagation(&self, id: &str, version: u64, urgent: bool) {
        let tx = self.propagation_tx.read().expect("ca engine lock poisoned").clone();
        if let Some(tx) = tx {
            let _ = tx.send(PropagationRequest {
                collection: COLLECTION.to_string(),
                id: id.to_string(),
                version,
                urgent,
            });
        }
    }

    /// Issue a new certificate.
    pub async fn issue(&self, req: IssueRequest) -> Result<Certificate> {
        self.require_ready()?;
        let identity = self.instance_identity().ok_or_else(|| CaError::NotReady("no instance identity".to_string()))?;

        let subject_public_key = match req.subject_public_key {
            Some(key) => key,
            None => self
                .keychain
                .public_key(&req.subject)
                .await?
                .ok_or_else(|| CaError::SubjectKeyMissing(req.subject.clone()))?,
        };

        let valid_from = req.valid_from.unwrap_or_else(now_ms);
        let valid_until = valid_from + parse_duration(&req.validity)?;

        let (issued_by, chain_depth) = if let Some(parent_id) = &req.chain_to {
            let parent_obj = self
                .store
                .latest(COLLECTION, parent_id)
                .await?
                .ok_or_else(|| CaError::ParentInvalid(format!("no such certificate {parent_id}")))?;
            let parent: Certificate = serde_json::from_value(parent_obj.value)?;
            let outcome = self.verify_certificate(&parent).await?;
            if !outcome.valid {
                return Err(CaError::ParentInvalid(format!(
                    "parent {parent_id} failed verification: {}",
                    outcome.reason.map(|r| r.code()).unwrap_or("unknown")
                )));
            }
            self.index_put(&parent)?;
            (Some(content_hash(&parent)?), parent.chain_depth + 1)
        } else {
            (None, 1)
        };

        let issued_at = valid_from;
        let serial_number = generate_serial_number(issued_at);
        let id = format!("cert:{}:{}:{}", req.kind.as_str(), req.subject, serial_number);

        let mut cert = Certificate {
            id,
            kind: req.kind,
            status: CertStatus::Valid,
            subject: req.subject.clone(),
            subject_public_key,
            issuer: identity.clone(),
            issuer_public_key: self
                .keychain
                .public_key(&identity)
                .await?
                .ok_or_else(|| CaError::NotReady("issuer has no signing key".to_string()))?,
            valid_from,
            valid_until,
            issued_by,
            chain_depth,
            claims: req.claims,
            issued_at,
            serial_number,
            version: 1,
            revocation_reason: None,
            signature: None,
        };

        let _guard = self.lock_for(&cert.id).await;
        self.sign_certificate(&mut cert, &identity)
            .await
            .map_err(|e| CaError::SigningFailure(e.to_string()))?;
        self.persist(&cert).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::CertificateIssued, identity)
                .with_subject(cert.subject.clone())
                .with_certificate(cert.id.clone(), cert.version),
        );
        debug!(cert_id = %cert.id, "issued certificate");
        Ok(cert)
    }

    async fn latest_or_not_found(&self, id: &str) -> Result<Certificate> {
        let object = self
            .store
            .latest(COLLECTION, id)
            .await?
            .ok_or_else(|| CaError::NotFound(id.to_string()))?;
        Ok(serde_json::from_value(object.value)?)
    }

    /// Extend an existing certificate's validity by `additional` milliseconds
    /// worth of the given duration string.
    pub async fn extend(&self, id: &str, additional: &str) -> Result<Certificate> {
        self.require_ready()?;
        let additional_ms = parse_duration(additional)?;
        if additional_ms <= 0 {
            return Err(CaError::InvalidDuration(format!("{additional} is not positive")));
        }
        let identity = self.instance_identity().ok_or_else(|| CaError::NotReady("no instance identity".to_string()))?;
        let _guard = self.lock_for(id).await;
        let prev = self.latest_or_not_found(id).await?;

        let mut next = prev.clone();
        next.valid_until = prev.valid_until + additional_ms;
        next.version = prev.version + 1;
        next.signature = None;
        self.sign_certificate(&mut next, &identity).await?;
        self.persist(&next).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::CertificateExtended, identity)
                .with_subject(next.subject.clone())
                .with_certificate(next.id.clone(), next.version),
        );
        Ok(next)
    }

    /// Reduce an existing certificate's `valid_until` to `new_valid_until`
    /// (milliseconds since epoch). Requires `now < new_valid_until <
    /// prev.valid_until`; use `revoke` instead to end validity immediately.
    pub async fn reduce(&self, id: &str, new_valid_until: i64) -> Result<Certificate> {
        self.require_ready()?;
        let identity = self.instance_identity().ok_or_else(|| CaError::NotReady("no instance identity".to_string()))?;
        let _guard = self.lock_for(id).await;
        let prev = self.latest_or_not_found(id).await?;

        let now = now_ms();
        if new_valid_until <= now {
            return Err(CaError::UseRevoke(format!(
                "{new_valid_until} is not in the future, call revoke() instead"
            )));
        }
        if new_valid_until >= prev.valid_until {
            return Err(CaError::NotAReduction(format!(
                "{new_valid_until} does not shrink the validity window (currently {})",
                prev.valid_until
            )));
        }

        let mut next = prev.clone();
        next.valid_until = new_valid_until;
        next.version = prev.version + 1;
        next.signature = None;
        self.sign_certificate(&mut next, &identity).await?;
        self.persist(&next).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::CertificateReduced, identity)
                .with_subject(next.subject.clone())
                .with_certificate(next.id.clone(), next.version),
        );
        Ok(next)
    }

    /// Revoke an existing certificate: sets `valid_until` to one millisecond
    /// before now and records `reason`.
    pub async fn revoke(&self, id: &str, reason: &str) -> Result<Certificate> {
        self.require_ready()?;
        let identity = self.instance_identity().ok_or_else(|| CaError::NotReady("no instance identity".to_string()))?;
        let _guard = self.lock_for(id).await;
        let prev = self.latest_or_not_found(id).await?;

        let mut next = prev.clone();
        next.valid_until = now_ms() - 1;
        next.status = CertStatus::Revoked;
        next.revocation_reason = Some(reason.to_string());
        next.version = prev.version + 1;
        next.signature = None;
        self.sign_certificate(&mut next, &identity).await?;
        self.persist(&next).await?;

        self.audit.record(
            AuditEvent::new(AuditEventType::CertificateRevoked, identity)
                .with_subject(next.subject.clone())
                .with_certificate(next.id.clone(), next.version)
                .with_reason(reason),
        );
        warn!(cert_id = %next.id, reason, "certificate revoked");
        Ok(next)
    }

    /// `verify_certificate`: check revocation/suspension/validity window/signature.
    pub async fn verify_certificate(&self, cert: &Certificate) -> Result<VerificationOutcome> {
        let now = now_ms();
        let status = cert.derive_status(now);
        let event = || {
            AuditEvent::new(AuditEventType::CertificateVerified, cert.issuer.clone())
                .with_subject(cert.subject.clone())
                .with_certificate(cert.id.clone(), cert.version)
        };

        if status == CertStatus::Revoked {
            self.audit.record(event().failed(VerificationFailure::Revoked.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::Revoked));
        }
        if status == CertStatus::Suspended {
            self.audit.record(event().failed(VerificationFailure::Suspended.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::Suspended));
        }
        if now < cert.valid_from {
            self.audit.record(event().failed(VerificationFailure::NotYetValid.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::NotYetValid));
        }
        if now > cert.valid_until {
            self.audit.record(event().failed(VerificationFailure::Expired.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::Expired));
        }
        let Some(signature) = &cert.signature else {
            self.audit.record(event().failed(VerificationFailure::BadSignature.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::BadSignature));
        };
        let message = canonical_bytes(cert)?;
        let ok = self.keychain.verify(&cert.issuer_public_key, &message, signature).await?;
        if !ok {
            self.audit.record(event().failed(VerificationFailure::BadSignature.code()));
            return Ok(VerificationOutcome::invalid(VerificationFailure::BadSignature));
        }
        self.audit.record(event());
        Ok(VerificationOutcome::valid())
    }

    /// Walk `issued_by` links back to a self-signed root, verifying each
    /// link. `root`, if supplied, must match the terminal certificate.
    pub async fn verify_chain(&self, cert: &Certificate, root: Option<&Certificate>) -> Result<ChainVerification> {
        let mut chain = vec![cert.clone()];
        let mut current = cert.clone();
        let mut depth = 0usize;

        loop {
            let outcome = self.verify_certificate(&current).await?;
            if !outcome.valid {
                return Ok(ChainVerification {
                    valid: false,
                    chain,
                    failed_at: Some(depth),
                    reason: outcome.reason.map(|r| r.code().to_string()),
                });
            }

            if current.is_root() {
                if let Some(root) = root {
                    if content_hash(&current)? != content_hash(root)? {
                        return Ok(ChainVerification {
                            valid: false,
                            chain,
                            failed_at: Some(depth),
                            reason: Some("root_mismatch".to_string()),
                        });
                    }
                }
                return Ok(ChainVerification { valid: true, chain, failed_at: None, reason: None });
            }

            let Some(parent_hash) = current.issued_by.clone() else {
                return Err(CaError::ChainBroken {
                    depth,
                    reason: "non-root certificate has no issued_by link".to_string(),
                });
            };
            let Some(parent) = self.resolve_by_hash(&parent_hash).await? else {
                return Err(CaError::ChainBroken {
                    depth: depth + 1,
                    reason: format!("parent with hash {parent_hash} not found"),
                });
            };
            if current.chain_depth == 0 || parent.chain_depth != current.chain_depth - 1 {
                return Ok(ChainVerification {
                    valid: false,
                    chain,
                    failed_at: Some(depth + 1),
                    reason: Some("chain_depth did not decrement by exactly one".to_string()),
                });
            }
            // Skip the window check when the parent is already revoked: that
            // failure is authoritative and surfaces from verifying the
            // parent itself on the next iteration, with the right reason.
            let parent_already_revoked = parent.derive_status(now_ms()) == CertStatus::Revoked;
            if !parent_already_revoked && (current.issued_at < parent.valid_from || current.issued_at > parent.valid_until) {
                return Ok(ChainVerification {
                    valid: false,
                    chain,
                    failed_at: Some(depth + 1),
                    reason: Some("issuance falls outside parent's validity window".to_string()),
                });
            }

            depth += 1;
            chain.push(parent.clone());
            current = parent;

            if depth > 64 {
                return Err(CaError::ChainBroken { depth, reason: "exceeded maximum chain depth".to_string() });
            }
        }
    }

    /// The highest-version stored certificate for `id`.
    pub async fn latest_version(&self, id: &str) -> Result<Option<Certificate>> {
        match self.store.latest(COLLECTION, id).await? {
            Some(object) => Ok(Some(serde_json::from_value(object.value)?)),
            None => Ok(None),
        }
    }

    /// Every stored version of `id`, in increasing version order.
    pub async fn history(&self, id: &str) -> Result<Vec<Certificate>> {
        let objects = self.store.history(COLLECTION, id).await?;
        objects
            .into_iter()
            .map(|o| serde_json::from_value(o.value).map_err(CaError::from))
            .collect()
    }

    /// Every latest-version certificate of `kind` issued to `subject`,
    /// newest-first by issuance time. Used to look up a peer's device-trust
    /// certificate without the caller needing to know its id.
    pub async fn find_by_subject(&self, kind: CertKind, subject: &str) -> Result<Vec<Certificate>> {
        let objects = self.store.find_by_field(COLLECTION, "subject", subject).await?;
        let mut certs: Vec<Certificate> = objects
            .into_iter()
            .map(|o| serde_json::from_value(o.value).map_err(CaError::from))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|c: &Certificate| c.kind == kind)
            .collect();
        certs.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(certs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryKeychain, MemoryObjectStore};
    use crate::certificate::Transition;
    use serde_json::json;

    async fn ready_engine() -> (CaEngine, String) {
        let keychain = Arc::new(MemoryKeychain::new());
        let store = Arc::new(MemoryObjectStore::new());
        let audit = Arc::new(AuditLog::new());
        let engine = CaEngine::new(CaConfig::default(), keychain, store, audit);
        let identity = "ca-instance-1".to_string();
        engine.init(identity.clone()).unwrap();
        engine.create_root(json!({})).await.unwrap();
        (engine, identity)
    }

    #[tokio::test]
    async fn issue_then_verify_succeeds() {
        let (engine, _identity) = ready_engine().await;
        let subject_key = "11".repeat(32);
        let cert = engine
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
        assert_eq!(cert.version, 1);
        let outcome = engine.verify_certificate(&cert).await.unwrap();
        assert!(outcome.valid);
    }

    #[tokio::test]
    async fn operations_before_ca_ready_are_rejected() {
        let keychain = Arc::new(MemoryKeychain::new());
        let store = Arc::new(MemoryObjectStore::new());
        let audit = Arc::new(AuditLog::new());
        let engine = CaEngine::new(CaConfig::default(), keychain, store, audit);
        let err = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "h_s".to_string(),
                subject_public_key: Some("aa".repeat(32)),
                validity: "1 year".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CaError::NotReady(_)));
    }

    #[tokio::test]
    async fn extend_increases_valid_until_and_bumps_version() {
        let (engine, _identity) = ready_engine().await;
        let cert = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "h_s".to_string(),
                subject_public_key: Some("22".repeat(32)),
                validity: "12 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: None,
            })
            .await
            .unwrap();
        let extended = engine.extend(&cert.id, "6 months").await.unwrap();
        assert_eq!(extended.version, 2);
        assert_eq!(
            extended.valid_until,
            cert.valid_until + crate::certificate::parse_duration("6 months").unwrap()
        );
        let history = engine.history(&cert.id).await.unwrap();
        assert_eq!(history.len(), 2);
        let transition = crate::certificate::infer_transition(&history[0], &history[1], Utc::now().timestamp_millis());
        assert_eq!(transition, Transition::Extend);
    }

    #[tokio::test]
    async fn revoke_denies_subsequent_verification() {
        let (engine, _identity) = ready_engine().await;
        let cert = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "h_s".to_string(),
                subject_public_key: Some("33".repeat(32)),
                validity: "12 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: None,
            })
            .await
            .unwrap();
        let revoked = engine.revoke(&cert.id, "key compromised").await.unwrap();
        assert_eq!(revoked.status, CertStatus::Revoked);
        let outcome = engine.verify_certificate(&revoked).await.unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.reason, Some(VerificationFailure::Revoked));
    }

    #[tokio::test]
    async fn reduce_rejects_windows_that_are_not_in_the_future() {
        let (engine, _identity) = ready_engine().await;
        let cert = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "h_s".to_string(),
                subject_public_key: Some("44".repeat(32)),
                validity: "12 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: None,
            })
            .await
            .unwrap();
        let err = engine.reduce(&cert.id, now_ms() - 1000).await.unwrap_err();
        assert!(matches!(err, CaError::UseRevoke(_)));
    }

    #[tokio::test]
    async fn chain_verification_walks_back_to_root() {
        let (engine, identity) = ready_engine().await;
        let root = engine.latest_version(&format!("cert:identity:{identity}:root")).await.unwrap().unwrap();

        let intermediate = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "intermediate".to_string(),
                subject_public_key: Some("55".repeat(32)),
                validity: "1 year".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: Some(root.id.clone()),
            })
            .await
            .unwrap();

        let leaf = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "leaf".to_string(),
                subject_public_key: Some("66".repeat(32)),
                validity: "3 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: Some(intermediate.id.clone()),
            })
            .await
            .unwrap();

        let result = engine.verify_chain(&leaf, Some(&root)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.chain.len(), 3);
    }

    #[tokio::test]
    async fn chain_verification_fails_after_intermediate_is_revoked() {
        let (engine, identity) = ready_engine().await;
        let root = engine.latest_version(&format!("cert:identity:{identity}:root")).await.unwrap().unwrap();

        let intermediate = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "intermediate".to_string(),
                subject_public_key: Some("77".repeat(32)),
                validity: "1 year".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: Some(root.id.clone()),
            })
            .await
            .unwrap();

        let leaf = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "leaf".to_string(),
                subject_public_key: Some("88".repeat(32)),
                validity: "3 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: Some(intermediate.id.clone()),
            })
            .await
            .unwrap();

        engine.revoke(&intermediate.id, "compromised").await.unwrap();

        let result = engine.verify_chain(&leaf, Some(&root)).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.failed_at, Some(1));
        assert_eq!(result.reason.as_deref(), Some("revoked"));
    }

    #[tokio::test]
    async fn shutdown_returns_to_uninitialised_and_rejects_root_dependent_operations() {
        let (engine, _identity) = ready_engine().await;
        assert_eq!(engine.state(), CaState::CAReady);

        engine.shutdown();

        assert_eq!(engine.state(), CaState::Uninitialised);
        assert!(engine.instance_identity().is_none());
        let err = engine
            .issue(IssueRequest {
                kind: CertKind::Identity,
                subject: "h_s".to_string(),
                subject_public_key: Some("11".repeat(32)),
                validity: "12 months".to_string(),
                valid_from: None,
                claims: json!({}),
                chain_to: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CaError::NotReady(_)));
    }

    #[tokio::test]
    async fn shutdown_then_reinit_reloads_the_existing_root_instead_of_minting_a_new_one() {
        let keychain = Arc::new(MemoryKeychain::new());
        let store = Arc::new(MemoryObjectStore::new());
        let audit = Arc::new(AuditLog::new());
        let engine = CaEngine::new(CaConfig::default(), keychain, store, audit);
        let identity = "ca-instance-reload".to_string();
        engine.init(identity.clone()).unwrap();
        let first_root = engine.create_root(json!({})).await.unwrap();

        engine.shutdown();
        engine.init(identity.clone()).unwrap();
        let second_root = engine.create_root(json!({})).await.unwrap();

        assert_eq!(first_root.id, second_root.id);
        assert_eq!(first_root.signature, second_root.signature);
        assert_eq!(engine.state(), CaState::CAReady);
    }
}
