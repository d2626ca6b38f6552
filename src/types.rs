//! Common value types shared across the certificate, VC, and trust modules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A SHA-256 content hash, stored as lowercase hex.
///
/// Used both for the content-addressed hash of a serialized object and for the
/// stable identity hash derived from a versioned entity's `id` field.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(String);

impl Hash {
    /// Wrap an already-lowercase hex digest. Does not re-validate hex-ness;
    /// callers go through `canonical::sha256_hex` to produce one.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Borrow the hex digest.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type-safe wrapper around a raw Ed25519 public key, hex-encoded on the wire.
///
/// Kept as hex rather than raw bytes at the API boundary because every port
/// (Keychain, Object Store, VC bridge) passes keys through JSON.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyHex(String);

impl PublicKeyHex {
    /// Wrap an already hex-encoded 32-byte Ed25519 public key.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Encode raw key bytes as hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Borrow the hex string.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes. Fails if the hex is malformed or not 32 bytes.
    pub fn to_bytes(&self) -> crate::error::Result<[u8; 32]> {
        let raw = hex::decode(&self.0)
            .map_err(|e| crate::error::CaError::Other(format!("bad public key hex: {e}")))?;
        raw.try_into()
            .map_err(|_| crate::error::CaError::Other("public key is not 32 bytes".to_string()))
    }
}

impl fmt::Debug for PublicKeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHex({})", self.0)
    }
}

impl fmt::Display for PublicKeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A phantom-typed marker distinguishing identity hashes that belong to
/// different concepts (a `Person`, a `Certificate`, a CA instance...) so they
/// can't be swapped at a call site by accident, following the teacher's
/// `EntityId<T>` convention.
pub struct TypedHash<T> {
    hash: Hash,
    _marker: PhantomData<T>,
}

impl<T> TypedHash<T> {
    /// Wrap a hash under this marker.
    pub fn new(hash: Hash) -> Self {
        Self {
            hash,
            _marker: PhantomData,
        }
    }

    /// Borrow the underlying hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }
}

impl<T> Clone for TypedHash<T> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for TypedHash<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
impl<T> Eq for TypedHash<T> {}

impl<T> std::hash::Hash for TypedHash<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl<T> fmt::Debug for TypedHash<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash.as_hex())
    }
}

impl<T> fmt::Display for TypedHash<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash.as_hex())
    }
}

/// Marker for identity hashes of a `Person` (a trust-graph node, or a
/// certificate's non-opaque subject).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonMarker;
/// Identity hash of a person.
pub type PersonHash = TypedHash<PersonMarker>;

/// Marker for identity hashes of a CA instance (issuer of certificates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaInstanceMarker;
/// Identity hash of a CA instance.
pub type CaInstanceHash = TypedHash<CaInstanceMarker>;

/// The kind discriminator for a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertKind {
    /// Identifies a person or a CA instance's root
    Identity,
    /// Device-trust certificate, with a canonical device-claims shape
    Device,
    /// Service account / non-person subject
    Service,
    /// Generic attestation
    Attestation,
    /// Authority delegation
    Delegation,
    /// A revocation record expressed as its own certificate kind
    Revocation,
}

impl CertKind {
    /// Lowercase wire form used both in VC `type` tags and DID/URN construction.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertKind::Identity => "identity",
            CertKind::Device => "device",
            CertKind::Service => "service",
            CertKind::Attestation => "attestation",
            CertKind::Delegation => "delegation",
            CertKind::Revocation => "revocation",
        }
    }

    /// Parse the lowercase wire form; unknown values default to `Identity`.
    pub fn parse_or_identity(s: &str) -> Self {
        match s {
            "device" => CertKind::Device,
            "service" => CertKind::Service,
            "attestation" => CertKind::Attestation,
            "delegation" => CertKind::Delegation,
            "revocation" => CertKind::Revocation,
            _ => CertKind::Identity,
        }
    }

    /// TitleCase form used in `cert_to_vc`'s `type` tag, e.g. `"IdentityCertificate"`.
    pub fn title_case(&self) -> String {
        if matches!(self, CertKind::Device) {
            return "DeviceTrust".to_string();
        }
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

/// Derived certificate status, computed from validity window and revocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    /// Currently within its validity window, unrevoked, unsuspended
    Valid,
    /// Past `valid_until` with no revocation reason recorded
    Expired,
    /// Explicitly revoked
    Revoked,
    /// Explicitly suspended
    Suspended,
}

/// Device-trust level, one of the canonical claims for `kind=device` certs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTrustLevel {
    /// Unrestricted
    Full,
    /// Restricted capability set
    Limited,
    /// Time-boxed
    Temporary,
}

/// Status of a `TrustRelationship`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustStatus {
    /// Peer is trusted
    Trusted,
    /// Peer is explicitly untrusted
    Untrusted,
    /// Awaiting verification
    Pending,
    /// Was trusted, now revoked
    Revoked,
}

/// Discrete trust level attached to a `TrustRelationship` (distinct from the
/// continuous `level` the evaluator returns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipTrustLevel {
    /// The caller's own identity
    SelfLevel,
    /// Strongly vetted
    High,
    /// Normally vetted
    Medium,
    /// Weakly vetted
    Low,
}

/// Directed social trust edge strength (`TrustEdge.level`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLevel {
    /// Has merely been invited
    Invited,
    /// Loosely known
    Known,
    /// Cryptographically verified
    Verified,
    /// Actively trusted
    Trusted,
    /// Part of the trust core
    Core,
}

/// Context under which trust is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustContext {
    /// High-stakes data movement, requires level >= 0.7
    FileTransfer,
    /// Ordinary messaging, requires level >= 0.5
    Communication,
    /// No threshold
    General,
}
