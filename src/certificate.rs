//! The certificate data model: the typed attestation every CA operation
//! reads and writes, plus its duration grammar and status derivation.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CaError, Result};
use crate::types::CertKind;

const MS_PER_DAY: i64 = 86_400_000;
const DAYS_PER_YEAR: i64 = 365;
const DAYS_PER_MONTH: i64 = 30;

/// A versioned, signed attestation linking an issuer to a subject's public
/// key. Identity is the stable `id`; `version` increases monotonically
/// across `issue`/`extend`/`reduce`/`revoke`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    /// Stable across versions; opaque to the core beyond equality
    pub id: String,
    pub kind: CertKind,
    /// Derived on read; the stored value is advisory only
    pub status: CertStatus,
    /// Identity hash of a Person, or an opaque string for non-person subjects
    pub subject: String,
    pub subject_public_key: String,
    /// Identity hash of the issuing CA instance
    pub issuer: String,
    pub issuer_public_key: String,
    pub valid_from: i64,
    pub valid_until: i64,
    /// Hash of the parent certificate this one chains to, if any
    pub issued_by: Option<String>,
    /// 0 for a root certificate, >=1 otherwise
    pub chain_depth: u32,
    pub claims: Value,
    pub issued_at: i64,
    /// Unique per issuer
    pub serial_number: String,
    pub version: u64,
    /// Reason recorded at revocation time, if any
    pub revocation_reason: Option<String>,
    /// Hex-encoded Ed25519 signature, elided from the canonical signing form
    pub signature: Option<String>,
}

impl Certificate {
    /// Whether this is a self-signed root: `issuer == subject`, `chain_depth == 0`.
    pub fn is_root(&self) -> bool {
        self.issuer == self.subject && self.chain_depth == 0
    }

    /// Recompute `status` per the derivation rule: explicit revocation wins,
    /// then expiry, then the persisted `suspended` flag, else `valid`.
    pub fn derive_status(&self, now_ms: i64) -> CertStatus {
        if self.revocation_reason.is_some() || self.status == CertStatus::Revoked {
            return CertStatus::Revoked;
        }
        if self.status == CertStatus::Suspended {
            return CertStatus::Suspended;
        }
        if self.valid_until < now_ms {
            return CertStatus::Expired;
        }
        CertStatus::Valid
    }

    /// `DateTime<Utc>` view of `valid_from`.
    pub fn valid_from_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.valid_from)
    }

    /// `DateTime<Utc>` view of `valid_until`.
    pub fn valid_until_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.valid_until)
    }

    /// `DateTime<Utc>` view of `issued_at`.
    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at)
    }
}

/// Re-export so callers matching on derived status don't need `types::`.
pub use crate::types::CertStatus;

/// Parse a duration expressed either in ISO-8601 (`P1Y`, `P6M`, `P90D`,
/// `PT6H`) or a small set of human forms (`"12 months"`, `"1 year"`,
/// `"90 days"`, `"6 hours"`), returning milliseconds.
///
/// Both grammars are accepted permanently rather than picking one, per the
/// chosen resolution of the duration-convention open question: 1 year = 365
/// days, 1 month = 30 days.
pub fn parse_duration(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix('P') {
        return parse_iso8601_duration(rest, trimmed);
    }
    parse_human_duration(trimmed)
}

fn parse_iso8601_duration(rest: &str, original: &str) -> Result<i64> {
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total_ms: i64 = 0;
    let mut any = false;

    for (number, unit) in split_designators(date_part) {
        any = true;
        total_ms += match unit {
            'Y' => number * DAYS_PER_YEAR * MS_PER_DAY,
            'M' => number * DAYS_PER_MONTH * MS_PER_DAY,
            'W' => number * 7 * MS_PER_DAY,
            'D' => number * MS_PER_DAY,
            _ => return Err(CaError::InvalidDuration(original.to_string())),
        };
    }

    if let Some(time_part) = time_part {
        for (number, unit) in split_designators(time_part) {
            any = true;
            total_ms += match unit {
                'H' => number * 3_600_000,
                'M' => number * 60_000,
                'S' => number * 1_000,
                _ => return Err(CaError::InvalidDuration(original.to_string())),
            };
        }
    }

    if !any {
        return Err(CaError::InvalidDuration(original.to_string()));
    }
    Ok(total_ms)
}

fn split_designators(segment: &str) -> Vec<(i64, char)> {
    let mut out = Vec::new();
    let mut num = String::new();
    for c in segment.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else {
            if let Ok(n) = num.parse::<i64>() {
                out.push((n, c));
            }
            num.clear();
        }
    }
    out
}

fn parse_human_duration(input: &str) -> Result<i64> {
    let lower = input.to_lowercase();
    let mut parts = lower.split_whitespace();
    let count: i64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CaError::InvalidDuration(input.to_string()))?;
    let unit = parts
        .next()
        .ok_or_else(|| CaError::InvalidDuration(input.to_string()))?;

    let ms = match unit.trim_end_matches('s') {
        "year" => count * DAYS_PER_YEAR * MS_PER_DAY,
        "month" => count * DAYS_PER_MONTH * MS_PER_DAY,
        "week" => count * 7 * MS_PER_DAY,
        "day" => count * MS_PER_DAY,
        "hour" => count * 3_600_000,
        "minute" => count * 60_000,
        "second" => count * 1_000,
        _ => return Err(CaError::InvalidDuration(input.to_string())),
    };
    Ok(ms)
}

static SERIAL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a serial number unique within an issuer: a monotonic counter
/// combined with the issuance timestamp and a short random tag.
pub fn generate_serial_number(issued_at_ms: i64) -> String {
    let counter = SERIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut tag_bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut tag_bytes);
    format!("{issued_at_ms:x}-{counter:x}-{}", hex::encode(tag_bytes))
}

/// Transition type inferred between two consecutive stored versions of the
/// same certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Extend,
    Reduce,
    Revoke,
    Renew,
}

/// Infer the transition type between `prev` and `curr`, per the comparison
/// table: revocation takes priority, then a widened window is an extension,
/// a narrowed-but-still-future window is a reduction, else a renewal.
pub fn infer_transition(prev: &Certificate, curr: &Certificate, now_ms: i64) -> Transition {
    if curr.status == CertStatus::Revoked || curr.valid_until < now_ms {
        return Transition::Revoke;
    }
    if curr.valid_until > prev.valid_until {
        return Transition::Extend;
    }
    if now_ms < curr.valid_until && curr.valid_until < prev.valid_until {
        return Transition::Reduce;
    }
    Transition::Renew
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_year_parses_as_365_days() {
        assert_eq!(parse_duration("P1Y").unwrap(), DAYS_PER_YEAR * MS_PER_DAY);
    }

    #[test]
    fn iso8601_months_and_days_compose() {
        assert_eq!(parse_duration("P6M").unwrap(), 6 * DAYS_PER_MONTH * MS_PER_DAY);
        assert_eq!(parse_duration("P90D").unwrap(), 90 * MS_PER_DAY);
    }

    #[test]
    fn iso8601_time_designator_hours() {
        assert_eq!(parse_duration("PT6H").unwrap(), 6 * 3_600_000);
    }

    #[test]
    fn human_forms_match_iso_equivalents() {
        assert_eq!(parse_duration("12 months").unwrap(), parse_duration("P12M").unwrap());
        assert_eq!(parse_duration("1 year").unwrap(), parse_duration("P1Y").unwrap());
        assert_eq!(parse_duration("90 days").unwrap(), parse_duration("P90D").unwrap());
        assert_eq!(parse_duration("6 hours").unwrap(), parse_duration("PT6H").unwrap());
    }

    #[test]
    fn garbage_input_is_invalid_duration() {
        assert!(matches!(
            parse_duration("not a duration"),
            Err(CaError::InvalidDuration(_))
        ));
    }

    #[test]
    fn serial_numbers_are_unique_across_calls() {
        let a = generate_serial_number(1_700_000_000_000);
        let b = generate_serial_number(1_700_000_000_000);
        assert_ne!(a, b);
    }

    fn base_cert() -> Certificate {
        Certificate {
            id: "cert:identity:h_s:1".to_string(),
            kind: CertKind::Identity,
            status: CertStatus::Valid,
            subject: "h_s".to_string(),
            subject_public_key: "ab".repeat(32),
            issuer: "h_i".to_string(),
            issuer_public_key: "cd".repeat(32),
            valid_from: 1_000,
            valid_until: 2_000,
            issued_by: None,
            chain_depth: 0,
            claims: serde_json::json!({}),
            issued_at: 1_000,
            serial_number: "s1".to_string(),
            version: 1,
            revocation_reason: None,
            signature: Some("00".repeat(64)),
        }
    }

    #[test]
    fn status_derives_expired_past_valid_until() {
        let c = base_cert();
        assert_eq!(c.derive_status(9_999), CertStatus::Expired);
    }

    #[test]
    fn status_derives_valid_within_window() {
        let c = base_cert();
        assert_eq!(c.derive_status(1_500), CertStatus::Valid);
    }

    #[test]
    fn status_derives_revoked_when_reason_present() {
        let mut c = base_cert();
        c.revocation_reason = Some("key compromised".to_string());
        assert_eq!(c.derive_status(1_500), CertStatus::Revoked);
    }

    #[test]
    fn transition_detects_extend_reduce_revoke_renew() {
        let prev = base_cert();
        let mut extended = prev.clone();
        extended.valid_until = 3_000;
        assert_eq!(infer_transition(&prev, &extended, 1_500), Transition::Extend);

        let mut reduced = prev.clone();
        reduced.valid_until = 1_800;
        assert_eq!(infer_transition(&prev, &reduced, 1_500), Transition::Reduce);

        let mut revoked = prev.clone();
        revoked.status = CertStatus::Revoked;
        assert_eq!(infer_transition(&prev, &revoked, 1_500), Transition::Revoke);
    }
}
