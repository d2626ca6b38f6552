//! Dual propagation: the automatic internal hand-off of newly persisted
//! certificate versions to connected peers, and the manual, portable export
//! and import of Verifiable Credential documents out-of-band.
//!
//! The two channels are independent and neither orders against the other;
//! receivers on both sides reconcile purely by `version` (spec I5, I9).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType, AuditLog};
use crate::ca::{CaEngine, PropagationRequest};
use crate::certificate::Certificate;
use crate::error::{CaError, Result};
use crate::ports::{KeychainPort, MailPort, ObjectStorePort, PeerTransportPort, StoredObject, WebEndpointPort};
use crate::vc::{self, VerifiableCredential};

const COLLECTION: &str = "certificates";
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Internal propagation status for one certificate id, per spec §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStatus {
    /// Enqueued, not yet attempted
    Pending,
    /// Delivery to the peer transport in flight
    Syncing,
    /// Delivered successfully
    Synced,
    /// Delivery attempted and failed; will retry with backoff
    Failed,
    /// The peer transport reports no connection
    Offline,
}

/// A caller-supplied renderer that turns a JSON-LD payload into a QR code
/// image. The core has no opinion on encoding format or image size.
pub trait QrRenderer: Send + Sync {
    /// Render `payload` (the JSON-LD text) into an image/bitmap of the
    /// renderer's own choosing.
    fn render(&self, payload: &str) -> Result<Vec<u8>>;
}

/// One recognized `export_external` option, per spec §4.8's option table.
pub enum ExportOption {
    /// Render the JSON-LD to a QR payload via the supplied renderer.
    QrCode(Arc<dyn QrRenderer>),
    /// Hand the document to the mail port for delivery to this address.
    Email(String),
    /// Write the JSON-LD to this file path.
    Download(PathBuf),
    /// PUT the JSON-LD to this HTTPS URL.
    WebEndpoint(String),
    /// Arbitrary free-form tag stored with the audit trail.
    Method(String),
}

/// What happened when applying each `ExportOption`.
#[derive(Debug, Clone, Default)]
pub struct ExportOutcome {
    /// The rendered QR image bytes, if `ExportOption::QrCode` was requested
    pub qr_code: Option<Vec<u8>>,
    /// Whether `ExportOption::Email` was delivered
    pub emailed: bool,
    /// The path written to, if `ExportOption::Download` was requested
    pub downloaded_to: Option<PathBuf>,
    /// The URL PUT to, if `ExportOption::WebEndpoint` was requested
    pub published_to: Option<String>,
    /// The free-form tag, if `ExportOption::Method` was supplied
    pub method: Option<String>,
}

/// The result of `PropagationService::export_external`.
#[derive(Debug, Clone)]
pub struct ExportedVC {
    /// Certificate id the credential presents
    pub certificate_id: String,
    /// Version exported
    pub version: u64,
    /// The Verifiable Credential itself
    pub credential: VerifiableCredential,
    /// The portable JSON-LD document (private fields stripped)
    pub document: Value,
    /// What each requested option did
    pub outcome: ExportOutcome,
}

/// The result of `PropagationService::import_external` when reconciliation
/// accepts the document. A rejection (stale/duplicate) is returned as
/// `CaError::StaleOrDuplicate` instead, per spec §4.8 step 5.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// Identity (`Certificate::id`) the imported credential resolved to
    pub certificate_id: String,
    /// Version now stored
    pub version: u64,
    /// Whether the signature verified at import time
    pub verified: bool,
}

/// Dual propagation service: owns the internal sync queue and status table,
/// and exposes the external export/import surface.
pub struct PropagationService {
    store: Arc<dyn ObjectStorePort>,
    transport: Arc<dyn PeerTransportPort>,
    keychain: Arc<dyn KeychainPort>,
    mail: Option<Arc<dyn MailPort>>,
    web: Option<Arc<dyn WebEndpointPort>>,
    audit: Arc<AuditLog>,
    status: StdRwLock<HashMap<String, PropagationStatus>>,
    propagation_tx: StdRwLock<Option<mpsc::UnboundedSender<PropagationRequest>>>,
}

impl PropagationService {
    /// Build a service over the given store/transport/keychain, with no
    /// mail or web port configured yet.
    pub fn new(
        store: Arc<dyn ObjectStorePort>,
        transport: Arc<dyn PeerTransportPort>,
        keychain: Arc<dyn KeychainPort>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            transport,
            keychain,
            mail: None,
            web: None,
            audit,
            status: StdRwLock::new(HashMap::new()),
            propagation_tx: StdRwLock::new(None),
        }
    }

    /// Attach a mail port, enabling `ExportOption::Email`.
    pub fn with_mail(mut self, mail: Arc<dyn MailPort>) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Attach a web endpoint port, enabling `ExportOption::WebEndpoint` and
    /// `publish_well_known_root`.
    pub fn with_web(mut self, web: Arc<dyn WebEndpointPort>) -> Self {
        self.web = Some(web);
        self
    }

    /// Wire this service into the same internal sync queue a `CaEngine`
    /// drains from, so imported versions are handed to the peer transport
    /// too, not just locally-issued ones. Pass the same sender given to the
    /// engine via `CaEngine::with_propagation_channel`.
    pub fn with_propagation_channel(&self, tx: mpsc::UnboundedSender<PropagationRequest>) {
        *self.propagation_tx.write().expect("propagation status lock poisoned") = Some(tx);
    }

    fn notify_propagation(&self, id: &str, version: u64, urgent: bool) {
        let tx = self.propagation_tx.read().expect("propagation status lock poisoned").clone();
        if let Some(tx) = tx {
            let _ = tx.send(PropagationRequest {
                collection: COLLECTION.to_string(),
                id: id.to_string(),
                version,
                urgent,
            });
        }
    }

    /// The last observed internal propagation status for `cert_id`, if any
    /// version of it has ever been enqueued.
    pub fn status(&self, cert_id: &str) -> Option<PropagationStatus> {
        self.status.read().expect("propagation status lock poisoned").get(cert_id).copied()
    }

    fn set_status(&self, cert_id: &str, status: PropagationStatus) {
        self.status
            .write()
            .expect("propagation status lock poisoned")
            .insert(cert_id.to_string(), status);
    }

    /// Drain `rx` forever, delivering each request to the peer transport.
    /// Retries failed deliveries with exponential backoff (capped at
    /// `MAX_RETRY_BACKOFF`); marks a request `Offline` instead of retrying
    /// immediately when the transport reports no connection. Urgent
    /// (revocation) requests are delivered first within the batch currently
    /// buffered in the channel.
    ///
    /// Intended to run as a long-lived background task: `tokio::spawn(async
    /// move { service.run(rx).await })`. Returns only when the sending half
    /// is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<PropagationRequest>) {
        while let Some(request) = rx.recv().await {
            let mut pending = vec![request];
            while let Ok(next) = rx.try_recv() {
                pending.push(next);
            }
            pending.sort_by_key(|r| !r.urgent);

            for request in pending {
                self.set_status(&request.id, PropagationStatus::Syncing);
                self.deliver_with_retry(request).await;
            }
        }
    }

    async fn deliver_with_retry(&self, request: PropagationRequest) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.transport.is_connected().await {
                Ok(false) => {
                    self.set_status(&request.id, PropagationStatus::Offline);
                    warn!(cert_id = %request.id, "peer transport offline, deferring propagation");
                    return;
                }
                Err(_) | Ok(true) => {}
            }

            let Some(object) = self.load_version(&request).await else {
                self.set_status(&request.id, PropagationStatus::Failed);
                return;
            };

            match self.transport.deliver(&request.collection, &request.id, &object.value, request.urgent).await {
                Ok(()) => {
                    self.set_status(&request.id, PropagationStatus::Synced);
                    debug!(cert_id = %request.id, version = request.version, "propagated to peer transport");
                    return;
                }
                Err(e) => {
                    self.set_status(&request.id, PropagationStatus::Failed);
                    warn!(cert_id = %request.id, error = %e, backoff_ms = backoff.as_millis() as u64, "propagation delivery failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
            }
        }
    }

    async fn load_version(&self, request: &PropagationRequest) -> Option<StoredObject> {
        match self.store.history(&request.collection, &request.id).await {
            Ok(versions) => versions.into_iter().find(|o| o.version == request.version),
            Err(_) => None,
        }
    }

    /// Convert certificate `cert_id` (its latest version, or `version` if
    /// given) to a Verifiable Credential, apply every requested option, and
    /// emit a `vc_exported` audit event.
    pub async fn export_external(
        &self,
        ca: &CaEngine,
        actor: &str,
        cert_id: &str,
        version: Option<u64>,
        options: Vec<ExportOption>,
    ) -> Result<ExportedVC> {
        let cert = match version {
            Some(v) => ca
                .history(cert_id)
                .await?
                .into_iter()
                .find(|c| c.version == v)
                .ok_or_else(|| CaError::NotFound(format!("{cert_id}@{v}")))?,
            None => ca.latest_version(cert_id).await?.ok_or_else(|| CaError::NotFound(cert_id.to_string()))?,
        };

        let credential = vc::cert_to_vc(&cert)?;
        let document = vc::to_wire_json(&credential)?;
        let payload = serde_json::to_string(&document)?;

        let mut outcome = ExportOutcome::default();
        for option in options {
            match option {
                ExportOption::QrCode(renderer) => {
                    outcome.qr_code = Some(renderer.render(&payload)?);
                }
                ExportOption::Email(addr) => {
                    let mail = self.mail.as_ref().ok_or_else(|| {
                        CaError::Other("email export requested but no MailPort configured".to_string())
                    })?;
                    mail.send(&addr, &format!("Certificate {cert_id}"), &payload).await?;
                    outcome.emailed = true;
                }
                ExportOption::Download(path) => {
                    tokio::fs::write(&path, &payload)
                        .await
                        .map_err(|e| CaError::Other(format!("failed writing {}: {e}", path.display())))?;
                    outcome.downloaded_to = Some(path);
                }
                ExportOption::WebEndpoint(url) => {
                    let web = self
                        .web
                        .as_ref()
                        .ok_or_else(|| CaError::Other("web_endpoint export requested but no WebEndpointPort configured".to_string()))?;
                    web.put(&url, &payload).await?;
                    outcome.published_to = Some(url);
                }
                ExportOption::Method(tag) => {
                    outcome.method = Some(tag);
                }
            }
        }

        self.audit.record(
            AuditEvent::new(AuditEventType::VcExported, actor)
                .with_subject(cert.subject.clone())
                .with_certificate(cert.id.clone(), cert.version),
        );
        info!(cert_id = %cert.id, version = cert.version, "exported certificate as verifiable credential");

        Ok(ExportedVC { certificate_id: cert.id.clone(), version: cert.version, credential, document, outcome })
    }

    /// Parse a JSON-LD document, bridge it back to a native certificate,
    /// verify it, and reconcile against whatever version (if any) is
    /// already stored, per spec §4.8 step 5.
    pub async fn import_external(&self, ca: &CaEngine, actor: &str, document: Value) -> Result<ImportOutcome> {
        let result = self.import_external_inner(ca, document).await;
        match &result {
            Ok(outcome) => {
                self.audit.record(
                    AuditEvent::new(AuditEventType::VcImported, actor)
                        .with_certificate(outcome.certificate_id.clone(), outcome.version),
                );
            }
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(AuditEventType::VcImported, actor).failed(e.to_string()),
                );
            }
        }
        result
    }

    async fn import_external_inner(&self, ca: &CaEngine, document: Value) -> Result<ImportOutcome> {
        let credential = vc::from_wire_json(document)?;
        let issuer_hash = crate::did::did_to_hash(&credential.issuer.id)?;
        let issuer_public_key = self.keychain.public_key(&issuer_hash).await?;
        let cert = vc::vc_to_cert(&credential, issuer_public_key.clone())?;

        let verified = if issuer_public_key.is_some() {
            ca.verify_certificate(&cert).await.map(|o| o.valid).unwrap_or(false)
        } else {
            false
        };

        let existing = self.store.latest(COLLECTION, &cert.id).await?;
        if let Some(existing) = &existing {
            if existing.version >= cert.version {
                return Err(CaError::StaleOrDuplicate { existing_version: existing.version });
            }
        }

        let value = serde_json::to_value(&cert)?;
        self.store
            .put_version(COLLECTION, &cert.id, StoredObject { version: cert.version, value })
            .await
            .map_err(|e| CaError::StoreFailure(e.to_string()))?;

        info!(cert_id = %cert.id, version = cert.version, verified, "imported certificate from verifiable credential");
        self.set_status(&cert.id, PropagationStatus::Pending);
        self.notify_propagation(&cert.id, cert.version, cert.status == crate::certificate::CertStatus::Revoked);

        Ok(ImportOutcome { certificate_id: cert.id, version: cert.version, verified })
    }

    /// Convert `root` to a Verifiable Credential and PUT it to `url` via the
    /// configured `WebEndpointPort`, for publication under
    /// `/.well-known/certificates/root`. The HTTP server itself is platform
    /// glue and out of scope; this only prepares and hands off the document.
    pub async fn publish_well_known_root(&self, root: &Certificate, url: &str) -> Result<()> {
        let web = self
            .web
            .as_ref()
            .ok_or_else(|| CaError::Other("publish_well_known_root requires a WebEndpointPort".to_string()))?;
        let credential = vc::cert_to_vc(root)?;
        let document = vc::to_wire_json(&credential)?;
        let payload = serde_json::to_string(&document)?;
        web.put(url, &payload).await
    }
}
