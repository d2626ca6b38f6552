//! Error types for the trust fabric core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CaError>;

/// Main error type for certificate authority and trust operations
#[derive(Error, Debug)]
pub enum CaError {
    /// CA engine was asked to do work before `create_root` completed
    #[error("CA not ready: {0}")]
    NotReady(String),

    /// Requested object, version, or relationship does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Duration string didn't parse as ISO-8601 or a recognized human form
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// A DID string was malformed for the `did:one:sha256` method
    #[error("invalid DID: {0}")]
    InvalidDID(String),

    /// A DID used a method other than `did:one:sha256`
    #[error("unsupported DID method: {0}")]
    UnsupportedDIDMethod(String),

    /// A VC `proof.type` was not `Ed25519Signature2020`
    #[error("unsupported proof type: {0}")]
    UnsupportedProofType(String),

    /// Signature did not verify against the claimed issuer key
    #[error("bad signature")]
    BadSignature,

    /// `now < valid_from`
    #[error("certificate not yet valid")]
    NotYetValid,

    /// `now > valid_until` with no revocation recorded
    #[error("certificate expired")]
    Expired,

    /// Certificate's derived status is `revoked`
    #[error("certificate revoked: {0}")]
    Revoked(String),

    /// `verify_chain` could not walk to a self-signed root
    #[error("chain broken at depth {depth}: {reason}")]
    ChainBroken {
        /// Index into the chain (0 = the certificate itself) where verification failed
        depth: usize,
        /// Human-readable reason
        reason: String,
    },

    /// `chain_to` target failed its own verification, or issuer mismatch
    #[error("parent certificate invalid: {0}")]
    ParentInvalid(String),

    /// `reduce` was called with a `new_valid_until` that isn't strictly in the past of `prev.valid_until`
    #[error("use revoke() instead: {0}")]
    UseRevoke(String),

    /// `reduce` target did not actually shrink the validity window
    #[error("not a reduction: {0}")]
    NotAReduction(String),

    /// Imported VC version is less than or equal to the locally stored version
    #[error("stale or duplicate import, existing version is {existing_version}")]
    StaleOrDuplicate {
        /// Version already stored locally
        existing_version: u64,
    },

    /// `subject_public_key` was omitted and the Keychain port had no key on file
    #[error("subject key missing: {0}")]
    SubjectKeyMissing(String),

    /// Object Store port failed
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// Keychain port failed to sign
    #[error("signing failure: {0}")]
    SigningFailure(String),

    /// Peer Transport port reports no connection
    #[error("transport offline")]
    TransportOffline,

    /// A suspending operation exceeded its deadline
    #[error("timed out")]
    TimedOut,

    /// A suspending operation was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors that don't warrant their own variant
    #[error("{0}")]
    Other(String),
}

impl CaError {
    /// Stable machine-readable code for this error, for callers that want to
    /// dispatch on error kind without matching the full enum.
    pub fn code(&self) -> &'static str {
        match self {
            CaError::NotReady(_) => "not_ready",
            CaError::NotFound(_) => "not_found",
            CaError::InvalidDuration(_) => "invalid_duration",
            CaError::InvalidDID(_) => "invalid_did",
            CaError::UnsupportedDIDMethod(_) => "unsupported_did_method",
            CaError::UnsupportedProofType(_) => "unsupported_proof_type",
            CaError::BadSignature => "bad_signature",
            CaError::NotYetValid => "not_yet_valid",
            CaError::Expired => "expired",
            CaError::Revoked(_) => "revoked",
            CaError::ChainBroken { .. } => "chain_broken",
            CaError::ParentInvalid(_) => "parent_invalid",
            CaError::UseRevoke(_) => "use_revoke",
            CaError::NotAReduction(_) => "not_a_reduction",
            CaError::StaleOrDuplicate { .. } => "stale_or_duplicate",
            CaError::SubjectKeyMissing(_) => "subject_key_missing",
            CaError::StoreFailure(_) => "store_failure",
            CaError::SigningFailure(_) => "signing_failure",
            CaError::TransportOffline => "transport_offline",
            CaError::TimedOut => "timed_out",
            CaError::Cancelled => "cancelled",
            CaError::Serialization(_) => "serialization",
            CaError::Other(_) => "other",
        }
    }
}
