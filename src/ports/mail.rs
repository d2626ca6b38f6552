//! Email delivery for the `email` external export option.

use async_trait::async_trait;

use crate::error::Result;

/// Sends an exported VC document to an email address.
#[async_trait]
pub trait MailPort: Send + Sync {
    /// Deliver `body` (JSON-LD text) to `to`, tagged with `subject`.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
