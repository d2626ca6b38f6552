//! Content-addressed, versioned object storage with reverse-map queries.
//!
//! The store is organized into named collections (`"certificates"`,
//! `"trust_relationships"`, ...); within a collection, objects are identified
//! by a stable id and keep every version ever written.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One stored version of an object, as raw JSON plus its version number.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub version: u64,
    pub value: Value,
}

/// Store/load content-addressed and versioned objects; reverse-map queries;
/// version enumeration.
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// Persist a new version of `id` within `collection`. Implementations
    /// must reject out-of-order or duplicate versions atomically.
    async fn put_version(&self, collection: &str, id: &str, object: StoredObject) -> Result<()>;

    /// The highest-version stored object for `id`, if any.
    async fn latest(&self, collection: &str, id: &str) -> Result<Option<StoredObject>>;

    /// Every stored version of `id`, in increasing version order.
    async fn history(&self, collection: &str, id: &str) -> Result<Vec<StoredObject>>;

    /// Reverse-map query: every object (latest version only) in `collection`
    /// whose JSON value has `field == value` at the top level.
    async fn find_by_field(&self, collection: &str, field: &str, value: &str) -> Result<Vec<StoredObject>>;

    /// Every id with at least one stored version in `collection`.
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>>;
}
