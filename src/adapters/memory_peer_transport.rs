//! In-memory peer transport: a loopback registry recording every delivery,
//! with a togglable connectivity flag for exercising offline handling.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::ports::PeerTransportPort;

/// Records every `deliver` call; `connected` defaults to `true` and can be
/// flipped to simulate an offline instance.
pub struct MemoryPeerTransport {
    connected: RwLock<bool>,
    deliveries: RwLock<Vec<(String, String, Value, bool)>>,
}

impl MemoryPeerTransport {
    /// A connected transport with no deliveries recorded yet.
    pub fn new() -> Self {
        Self {
            connected: RwLock::new(true),
            deliveries: RwLock::new(Vec::new()),
        }
    }

    /// Flip connectivity, for tests exercising offline propagation.
    pub fn set_connected(&self, connected: bool) {
        *self.connected.write().expect("transport lock poisoned") = connected;
    }

    /// Snapshot every delivery recorded so far.
    pub fn deliveries(&self) -> Vec<(String, String, Value, bool)> {
        self.deliveries.read().expect("transport lock poisoned").clone()
    }
}

impl Default for MemoryPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransportPort for MemoryPeerTransport {
    async fn deliver(&self, collection: &str, id: &str, value: &Value, urgent: bool) -> Result<()> {
        self.deliveries.write().expect("transport lock poisoned").push((
            collection.to_string(),
            id.to_string(),
            value.clone(),
            urgent,
        ));
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(*self.connected.read().expect("transport lock poisoned"))
    }
}
