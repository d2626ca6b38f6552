//! The `did:one:sha256` DID method: a decentralized identifier that is
//! nothing more than a labeled SHA-256 hash.
//!
//! Unlike `did:key` or `did:web`, this method carries no embedded key
//! material — it names an entity by the hash of its identity record, and
//! resolution (looking up that entity's current public key) is left to the
//! object store and keychain, not encoded in the DID itself.

use crate::error::{CaError, Result};

const METHOD_PREFIX: &str = "did:one:sha256:";

/// Render an identity hash as a `did:one:sha256:<hex>` string.
pub fn hash_to_did(hex_hash: &str) -> String {
    format!("{METHOD_PREFIX}{hex_hash}")
}

/// Parse a `did:one:sha256:<hex>` string back to its bare hex hash.
///
/// Returns `UnsupportedDIDMethod` for any DID that isn't `did:one:...`, and
/// `InvalidDID` for a `did:one:` DID that doesn't use the `sha256` hash
/// function or has a malformed hex suffix.
pub fn did_to_hash(did: &str) -> Result<String> {
    if let Some(rest) = did.strip_prefix(METHOD_PREFIX) {
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CaError::InvalidDID(did.to_string()));
        }
        return Ok(rest.to_lowercase());
    }
    if did.starts_with("did:one:") {
        return Err(CaError::InvalidDID(format!(
            "unsupported hash function in {did}"
        )));
    }
    let method = did
        .strip_prefix("did:")
        .and_then(|rest| rest.split(':').next())
        .unwrap_or(did);
    Err(CaError::UnsupportedDIDMethod(method.to_string()))
}

/// The verification-method identifier for the sole key associated with a
/// `did:one:sha256` subject, i.e. `<did>#keys-1`.
pub fn verification_method(did: &str) -> String {
    format!("{did}#keys-1")
}

/// Strip a `#fragment` verification-method id back down to its subject DID.
pub fn subject_of_verification_method(verification_method: &str) -> &str {
    verification_method
        .split('#')
        .next()
        .unwrap_or(verification_method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_through_did() {
        let hash = "a1b2c3d4";
        let did = hash_to_did(hash);
        assert_eq!(did, "did:one:sha256:a1b2c3d4");
        assert_eq!(did_to_hash(&did).unwrap(), hash);
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let err = did_to_hash("did:key:zABC").unwrap_err();
        assert!(matches!(err, CaError::UnsupportedDIDMethod(m) if m == "key"));
    }

    #[test]
    fn unsupported_hash_function_under_did_one_is_rejected() {
        let err = did_to_hash("did:one:blake3:abc").unwrap_err();
        assert!(matches!(err, CaError::InvalidDID(_)));
    }

    #[test]
    fn empty_hash_suffix_is_rejected() {
        let err = did_to_hash("did:one:sha256:").unwrap_err();
        assert!(matches!(err, CaError::InvalidDID(_)));
    }

    #[test]
    fn non_hex_suffix_is_rejected() {
        let err = did_to_hash("did:one:sha256:not-hex!").unwrap_err();
        assert!(matches!(err, CaError::InvalidDID(_)));
    }

    #[test]
    fn verification_method_and_subject_round_trip() {
        let did = "did:one:sha256:deadbeef";
        let vm = verification_method(did);
        assert_eq!(vm, "did:one:sha256:deadbeef#keys-1");
        assert_eq!(subject_of_verification_method(&vm), did);
    }
}
