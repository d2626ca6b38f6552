//! Delivery of new object versions between connected CA instances.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Delivers new object versions to connected peers and reports connectivity.
#[async_trait]
pub trait PeerTransportPort: Send + Sync {
    /// Hand a new version off to connected peers. `urgent` certificates
    /// (revocations) should jump any internal send queue.
    async fn deliver(&self, collection: &str, id: &str, value: &Value, urgent: bool) -> Result<()>;

    /// Whether this instance currently has at least one connected peer.
    async fn is_connected(&self) -> Result<bool>;
}
