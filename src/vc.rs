//! The bidirectional bridge between native certificates and W3C Verifiable
//! Credentials in JSON-LD.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::certificate::{Certificate, CertStatus};
use crate::did::{did_to_hash, hash_to_did};
use crate::error::{CaError, Result};
use crate::proof::{native_to_w3c, w3c_to_native, Proof};
use crate::types::CertKind;

const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
const ED25519_2020_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// `issuer` on a VC: either a bare DID string or `{id, name?}` — modeled as
/// the richer form so construction is uniform; serializes to the bare
/// string form when `name` is absent, matching what issuers typically emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialIssuer {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The `credentialSubject` block: a DID, the subject's public key, and
/// whatever kind-specific claims were on the certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialSubject {
    pub id: String,
    pub public_key: String,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Private, non-normative metadata carried alongside the VC so the bridge
/// can round-trip fields the W3C model has no slot for: chain linkage and
/// the issuer-assigned serial number have no natural place in a W3C
/// `credentialSubject`, but still need to survive a round trip back to a
/// native certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialMetadata {
    pub version: u64,
    pub chain_depth: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issued_by: Option<String>,
    #[serde(default)]
    pub serial_number: String,
}

/// A W3C Verifiable Credential presentation of a `Certificate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: CredentialIssuer,
    pub issuance_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub credential_subject: CredentialSubject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<Value>,
    /// Carries the version number across storage; absent on an exported
    /// wire document, where `to_wire_json` strips it.
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CredentialMetadata>,
}

fn ms_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| CaError::Other(format!("timestamp {ms} out of range")))
}

/// Serialize a credential to the portable wire form: `_metadata` (a
/// platform-private extension) stripped, matching the documented JSON-LD
/// export shape.
pub fn to_wire_json(vc: &VerifiableCredential) -> Result<Value> {
    let mut value = serde_json::to_value(vc)?;
    if let Value::Object(map) = &mut value {
        map.remove("_metadata");
    }
    Ok(value)
}

/// Parse a wire-form (or internally stored) JSON-LD document. A document
/// with no `_metadata` is treated as version 1 by `vc_to_cert`.
pub fn from_wire_json(value: Value) -> Result<VerifiableCredential> {
    Ok(serde_json::from_value(value)?)
}

/// Convert a native certificate to its Verifiable Credential presentation.
pub fn cert_to_vc(cert: &Certificate) -> Result<VerifiableCredential> {
    let issuer_did = hash_to_did(&cert.issuer);
    let subject_did = hash_to_did(&cert.subject);

    let issuer_name = cert
        .claims
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut claims = match &cert.claims {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    claims.remove("id");
    claims.remove("public_key");

    let proof = match &cert.signature {
        Some(signature) => Some(native_to_w3c(signature, &issuer_did, ms_to_utc(cert.issued_at)?)?),
        None => None,
    };

    Ok(VerifiableCredential {
        context: vec![CREDENTIALS_V1_CONTEXT.to_string(), ED25519_2020_CONTEXT.to_string()],
        id: format!("urn:one:cert:{}", cert.id),
        types: vec!["VerifiableCredential".to_string(), format!("{}Credential", cert.kind.title_case())],
        issuer: CredentialIssuer { id: issuer_did, name: issuer_name },
        issuance_date: ms_to_utc(cert.issued_at)?,
        expiration_date: ms_to_utc(cert.valid_until)?,
        credential_subject: CredentialSubject {
            id: subject_did,
            public_key: cert.subject_public_key.clone(),
            claims,
        },
        proof,
        credential_status: None,
        metadata: Some(CredentialMetadata {
            version: cert.version,
            chain_depth: cert.chain_depth,
            issued_by: cert.issued_by.clone(),
            serial_number: cert.serial_number.clone(),
        }),
    })
}

/// Convert a Verifiable Credential back to a native certificate.
///
/// `issuer_public_key`, if supplied, is used verbatim (it is not carried on
/// the wire); pass `None` when the caller cannot resolve it yet — the
/// resulting certificate is then marked unverified (`issuer_public_key`
/// empty) until a subsequent lookup fills it in.
pub fn vc_to_cert(vc: &VerifiableCredential, issuer_public_key: Option<String>) -> Result<Certificate> {
    let kind = vc
        .types
        .iter()
        .find(|t| t.as_str() != "VerifiableCredential")
        .map(|t| {
            let stripped = t.strip_suffix("Credential").unwrap_or(t);
            let snake = title_case_to_snake(stripped);
            CertKind::parse_or_identity(&snake)
        })
        .unwrap_or(CertKind::Identity);

    let issuer_hash = did_to_hash(&vc.issuer.id)?;
    let subject_hash = did_to_hash(&vc.credential_subject.id)?;

    let id = vc
        .id
        .strip_prefix("urn:one:cert:")
        .ok_or_else(|| CaError::Other(format!("not a certificate URN: {}", vc.id)))?
        .to_string();

    let signature = match &vc.proof {
        Some(proof) => Some(w3c_to_native(proof)?),
        None => None,
    };

    let mut claims = Map::new();
    for (k, v) in &vc.credential_subject.claims {
        claims.insert(k.clone(), v.clone());
    }

    Ok(Certificate {
        id,
        kind,
        status: CertStatus::Valid,
        subject: subject_hash,
        subject_public_key: vc.credential_subject.public_key.clone(),
        issuer: issuer_hash,
        issuer_public_key: issuer_public_key.unwrap_or_default(),
        valid_from: vc.issuance_date.timestamp_millis(),
        valid_until: vc.expiration_date.timestamp_millis(),
        issued_by: vc.metadata.as_ref().and_then(|m| m.issued_by.clone()),
        chain_depth: vc.metadata.as_ref().map(|m| m.chain_depth).unwrap_or(0),
        claims: Value::Object(claims),
        issued_at: vc.issuance_date.timestamp_millis(),
        serial_number: vc.metadata.as_ref().map(|m| m.serial_number.clone()).unwrap_or_default(),
        version: vc.metadata.as_ref().map(|m| m.version).unwrap_or(1),
        revocation_reason: None,
        signature,
    })
}

fn title_case_to_snake(s: &str) -> String {
    if s == "DeviceTrust" {
        return "device".to_string();
    }
    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
