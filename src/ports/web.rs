//! HTTPS publication for the `web_endpoint` export option and the
//! well-known root document.

use async_trait::async_trait;

use crate::error::Result;

/// Publishes a JSON-LD document to an HTTPS endpoint.
#[async_trait]
pub trait WebEndpointPort: Send + Sync {
    /// PUT `body` (JSON-LD text) to `url`.
    async fn put(&self, url: &str, body: &str) -> Result<()>;
}
