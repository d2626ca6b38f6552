//! Per-instance configuration. The core is otherwise configuration-free.

use serde::{Deserialize, Serialize};

/// The handful of settings a CA instance needs at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    /// Human-readable name embedded in the root certificate's claims
    pub ca_name: String,
    /// Domain this instance represents, used when publishing the root
    pub domain: String,
    /// Default validity duration for a freshly created root, e.g. `"10 years"`
    pub root_validity: String,
    /// How long audit events are kept before `AuditLog::prune` removes them, in milliseconds
    pub audit_retention_ms: i64,
    /// Minimum `level` required to satisfy the `file-transfer` trust context
    pub file_transfer_threshold: f64,
    /// Minimum `level` required to satisfy the `communication` trust context
    pub communication_threshold: f64,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            ca_name: "Unnamed CA".to_string(),
            domain: "localhost".to_string(),
            root_validity: "10 years".to_string(),
            audit_retention_ms: 90 * 86_400_000,
            file_transfer_threshold: 0.7,
            communication_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_thresholds() {
        let config = CaConfig::default();
        assert_eq!(config.file_transfer_threshold, 0.7);
        assert_eq!(config.communication_threshold, 0.5);
        assert_eq!(config.root_validity, "10 years");
    }
}
