//! In-memory Ed25519 keychain: generates and holds keys for test identities.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::debug;

use crate::error::{CaError, Result};
use crate::ports::KeychainPort;

/// Holds one `SigningKey` per identity hash, generated on first use.
pub struct MemoryKeychain {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl MemoryKeychain {
    /// An empty keychain; keys are generated lazily per identity, or eagerly
    /// via `generate_keypair`.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    fn key_for(&self, identity: &str) -> SigningKey {
        if let Some(key) = self.keys.read().expect("keychain lock poisoned").get(identity) {
            return key.clone();
        }
        let key = SigningKey::generate(&mut OsRng);
        self.keys
            .write()
            .expect("keychain lock poisoned")
            .insert(identity.to_string(), key.clone());
        key
    }
}

impl Default for MemoryKeychain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeychainPort for MemoryKeychain {
    async fn sign(&self, identity: &str, message: &[u8]) -> Result<String> {
        let key = self.key_for(identity);
        let signature: Signature = key.sign(message);
        debug!(identity, "signed message with memory keychain");
        Ok(hex::encode(signature.to_bytes()))
    }

    async fn verify(&self, public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<bool> {
        let key_bytes = hex::decode(public_key_hex)
            .map_err(|e| CaError::Other(format!("bad public key hex: {e}")))?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| CaError::Other("public key is not 32 bytes".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_array)
            .map_err(|e| CaError::Other(format!("bad public key: {e}")))?;

        let sig_bytes = hex::decode(signature_hex)
            .map_err(|e| CaError::Other(format!("bad signature hex: {e}")))?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CaError::Other("signature is not 64 bytes".to_string()))?;
        let signature = Signature::from_bytes(&sig_array);

        Ok(verifying_key.verify(message, &signature).is_ok())
    }

    async fn public_key(&self, identity: &str) -> Result<Option<String>> {
        let keys = self.keys.read().expect("keychain lock poisoned");
        Ok(keys
            .get(identity)
            .map(|key| hex::encode(key.verifying_key().to_bytes())))
    }

    async fn generate_keypair(&self, identity: &str) -> Result<String> {
        let key = SigningKey::generate(&mut OsRng);
        let public = hex::encode(key.verifying_key().to_bytes());
        self.keys
            .write()
            .expect("keychain lock poisoned")
            .insert(identity.to_string(), key);
        Ok(public)
    }

    async fn random_nonce(&self) -> Result<String> {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(hex::encode(bytes))
    }
}
