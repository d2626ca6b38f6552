//! Append-only audit log for CA and trust operations.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of operation an `AuditEvent` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    CertificateIssued,
    CertificateExtended,
    CertificateReduced,
    CertificateRevoked,
    CertificateVerified,
    TrustEstablished,
    TrustRevoked,
    VcExported,
    VcImported,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub subject: Option<String>,
    pub certificate_id: Option<String>,
    pub certificate_hash: Option<String>,
    pub certificate_version: Option<u64>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    /// Start building an event for `event_type` performed by `actor`, now.
    pub fn new(event_type: AuditEventType, actor: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            actor: actor.into(),
            subject: None,
            certificate_id: None,
            certificate_hash: None,
            certificate_version: None,
            reason: None,
            metadata: None,
            success: true,
            error: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_certificate(mut self, id: impl Into<String>, version: u64) -> Self {
        self.certificate_id = Some(id.into());
        self.certificate_version = Some(version);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Filter predicate for `AuditLog::query`; every populated field narrows the
/// result set, combined with AND.
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub subject: Option<String>,
    pub certificate_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Append-only in-memory audit trail, queryable and newest-first by default.
pub struct AuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl AuditLog {
    /// An empty log.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append one event. Never fails: persistence failures here would have
    /// nowhere else to go since this log IS the record of failure.
    pub fn record(&self, event: AuditEvent) {
        self.events.write().expect("audit log lock poisoned").push(event);
    }

    /// Every event matching `query`, newest-first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read().expect("audit log lock poisoned");
        let mut matches: Vec<AuditEvent> = events
            .iter()
            .filter(|e| query.actor.as_deref().map_or(true, |a| e.actor == a))
            .filter(|e| query.subject.is_none() || e.subject == query.subject)
            .filter(|e| query.certificate_id.is_none() || e.certificate_id == query.certificate_id)
            .filter(|e| query.since.map_or(true, |since| e.timestamp >= since))
            .filter(|e| query.until.map_or(true, |until| e.timestamp <= until))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches
    }

    /// Drop every event older than `retention_ms` milliseconds, relative to now.
    pub fn prune(&self, retention_ms: i64) {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(retention_ms);
        let mut events = self.events.write().expect("audit log lock poisoned");
        events.retain(|e| e.timestamp >= cutoff);
    }

    /// Total number of events currently retained.
    pub fn len(&self) -> usize {
        self.events.read().expect("audit log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_newest_first() {
        let log = AuditLog::new();
        log.record(AuditEvent::new(AuditEventType::CertificateIssued, "alice"));
        log.record(AuditEvent::new(AuditEventType::CertificateRevoked, "alice"));
        let results = log.query(&AuditQuery::default());
        assert_eq!(results[0].event_type, AuditEventType::CertificateRevoked);
        assert_eq!(results[1].event_type, AuditEventType::CertificateIssued);
    }

    #[test]
    fn query_filters_by_actor() {
        let log = AuditLog::new();
        log.record(AuditEvent::new(AuditEventType::CertificateIssued, "alice"));
        log.record(AuditEvent::new(AuditEventType::CertificateIssued, "bob"));
        let results = log.query(&AuditQuery {
            actor: Some("bob".to_string()),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].actor, "bob");
    }

    #[test]
    fn failed_event_carries_error_text() {
        let event = AuditEvent::new(AuditEventType::CertificateVerified, "system").failed("bad signature");
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("bad signature"));
    }

    #[test]
    fn prune_removes_nothing_when_retention_covers_all_events() {
        let log = AuditLog::new();
        log.record(AuditEvent::new(AuditEventType::CertificateIssued, "alice"));
        log.prune(86_400_000);
        assert_eq!(log.len(), 1);
    }
}
