//! # one-trust-ca
//!
//! A decentralized certificate authority and trust fabric. Every participating
//! instance is itself a CA that mints, extends, reduces, and revokes
//! time-bound certificates, chains them to a self-signed local root, and
//! evaluates multi-factor trust across a social graph of peers. The same
//! attestations are exposed both as native content-addressed objects (for
//! peer-to-peer sync) and as W3C Verifiable Credentials in JSON-LD (for
//! external interoperability); the `vc` module guarantees a lossless
//! round-trip between the two.
//!
//! ## Architecture
//!
//! The crate is organized around narrow port traits for the external
//! collaborators it consumes rather than implements:
//! - `ports`: `KeychainPort`, `ObjectStorePort`, `PeerTransportPort`,
//!   `MailPort`, `WebEndpointPort` — signing, storage, and transport live
//!   outside the core.
//! - `adapters`: in-memory reference implementations of those ports, for
//!   tests and demos. Not a production backend.
//!
//! The core itself is organized bottom-up:
//! - `canonical`, `did`, `proof`: deterministic serialization, the
//!   `did:one:sha256` method, and `Ed25519Signature2020` proof translation.
//! - `certificate`: the typed certificate model, duration grammar, and
//!   status derivation.
//! - `ca`: the CA engine — root lifecycle, issuance, version transitions,
//!   chain verification.
//! - `vc`: the bidirectional Certificate <-> Verifiable Credential bridge.
//! - `trust`: device-level trust relationships and the social trust graph.
//! - `propagation`: dual propagation, internal object-store sync and
//!   external portable VC documents, with version-based reconciliation.
//! - `audit`: the append-only audit log.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod adapters;
pub mod audit;
pub mod ca;
pub mod canonical;
pub mod certificate;
pub mod config;
pub mod did;
pub mod error;
pub mod ports;
pub mod proof;
pub mod propagation;
pub mod trust;
pub mod types;
pub mod vc;

pub use error::{CaError, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditEventType, AuditLog, AuditQuery};
    pub use crate::ca::{CaEngine, CaState, IssueRequest, VerificationFailure, VerificationOutcome};
    pub use crate::certificate::{Certificate, CertStatus};
    pub use crate::config::CaConfig;
    pub use crate::error::{CaError, Result};
    pub use crate::ports::{KeychainPort, MailPort, ObjectStorePort, PeerTransportPort, WebEndpointPort};
    pub use crate::propagation::{ExportOption, PropagationService, PropagationStatus};
    pub use crate::trust::{CaDeviceTrustVerifier, DeviceTrustVerifier, EdgeGraph, TrustRelationship, TrustStore};
    pub use crate::types::{CertKind, EdgeLevel, TrustContext, TrustStatus};
    pub use crate::vc::{cert_to_vc, vc_to_cert, VerifiableCredential};
}
