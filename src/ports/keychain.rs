//! The signing keychain: sign, verify, and expose public keys without ever
//! disclosing private key material to the core.

use async_trait::async_trait;

use crate::error::Result;

/// Signs on behalf of identities the core names by their identity hash,
/// without ever exposing the underlying private key.
#[async_trait]
pub trait KeychainPort: Send + Sync {
    /// Sign `message` with the identity's current key, returning a
    /// hex-encoded Ed25519 signature.
    async fn sign(&self, identity: &str, message: &[u8]) -> Result<String>;

    /// Verify a hex-encoded Ed25519 signature against a hex-encoded public key.
    async fn verify(&self, public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<bool>;

    /// Look up the current public key on file for `identity`, hex-encoded.
    /// Returns `None` if no key is known for that identity.
    async fn public_key(&self, identity: &str) -> Result<Option<String>>;

    /// Generate and register a fresh keypair for `identity`, returning its
    /// hex-encoded public key.
    async fn generate_keypair(&self, identity: &str) -> Result<String>;

    /// A cryptographically random nonce, hex-encoded. Exists for callers
    /// implementing a handshake flow against this port; the core itself
    /// does not use it.
    async fn random_nonce(&self) -> Result<String>;
}
