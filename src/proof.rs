//! Translation between raw Ed25519 signatures and `Ed25519Signature2020`
//! linked-data proof blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaError, Result};

const PROOF_TYPE: &str = "Ed25519Signature2020";
const PROOF_PURPOSE: &str = "assertionMethod";

/// A W3C linked-data proof block, as embedded in a Verifiable Credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    pub proof_purpose: String,
    pub verification_method: String,
    pub proof_value: String,
}

/// Build an `Ed25519Signature2020` proof from a raw hex-encoded signature.
pub fn native_to_w3c(signature_hex: &str, issuer_did: &str, issued_at: DateTime<Utc>) -> Result<Proof> {
    let raw = hex::decode(signature_hex)
        .map_err(|e| CaError::Other(format!("bad signature hex: {e}")))?;
    let proof_value = multibase::encode(multibase::Base::Base58Btc, raw);
    Ok(Proof {
        proof_type: PROOF_TYPE.to_string(),
        created: issued_at,
        proof_purpose: PROOF_PURPOSE.to_string(),
        verification_method: crate::did::verification_method(issuer_did),
        proof_value,
    })
}

/// Recover the raw hex-encoded signature from a proof block.
///
/// Fails with `UnsupportedProofType` unless `proof.proof_type ==
/// "Ed25519Signature2020"`.
pub fn w3c_to_native(proof: &Proof) -> Result<String> {
    if proof.proof_type != PROOF_TYPE {
        return Err(CaError::UnsupportedProofType(proof.proof_type.clone()));
    }
    let (_base, raw) = multibase::decode(&proof.proof_value)
        .map_err(|e| CaError::Other(format!("bad proofValue encoding: {e}")))?;
    Ok(hex::encode(raw))
}
