//! In-memory `ObjectStorePort`: a nested map keyed by collection then id,
//! holding every version ever written.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CaError, Result};
use crate::ports::{ObjectStorePort, StoredObject};

/// `Arc<RwLock<HashMap<...>>>`-backed store; every version lives forever.
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, HashMap<String, Vec<StoredObject>>>>,
}

impl MemoryObjectStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorePort for MemoryObjectStore {
    async fn put_version(&self, collection: &str, id: &str, object: StoredObject) -> Result<()> {
        let mut objects = self.objects.write().expect("object store lock poisoned");
        let ids = objects.entry(collection.to_string()).or_default();
        let versions = ids.entry(id.to_string()).or_default();

        if let Some(last) = versions.last() {
            if object.version <= last.version {
                return Err(CaError::StoreFailure(format!(
                    "version {} is not strictly greater than stored version {}",
                    object.version, last.version
                )));
            }
        }
        debug!(collection, id, version = object.version, "persisted object version");
        versions.push(object);
        Ok(())
    }

    async fn latest(&self, collection: &str, id: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        Ok(objects
            .get(collection)
            .and_then(|ids| ids.get(id))
            .and_then(|versions| versions.last().cloned()))
    }

    async fn history(&self, collection: &str, id: &str) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        Ok(objects
            .get(collection)
            .and_then(|ids| ids.get(id))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_field(&self, collection: &str, field: &str, value: &str) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        let Some(ids) = objects.get(collection) else {
            return Ok(Vec::new());
        };
        let mut matches = Vec::new();
        for versions in ids.values() {
            if let Some(latest) = versions.last() {
                if latest.value.get(field).and_then(|v| v.as_str()) == Some(value) {
                    matches.push(latest.clone());
                }
            }
        }
        Ok(matches)
    }

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        Ok(objects
            .get(collection)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn latest_returns_highest_version() {
        let store = MemoryObjectStore::new();
        store
            .put_version("certificates", "c1", StoredObject { version: 1, value: json!({"v": 1}) })
            .await
            .unwrap();
        store
            .put_version("certificates", "c1", StoredObject { version: 2, value: json!({"v": 2}) })
            .await
            .unwrap();
        let latest = store.latest("certificates", "c1").await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn out_of_order_version_is_rejected() {
        let store = MemoryObjectStore::new();
        store
            .put_version("certificates", "c1", StoredObject { version: 2, value: json!({}) })
            .await
            .unwrap();
        let err = store
            .put_version("certificates", "c1", StoredObject { version: 1, value: json!({}) })
            .await
            .unwrap_err();
        assert!(matches!(err, CaError::StoreFailure(_)));
    }

    #[tokio::test]
    async fn history_returns_every_version_in_order() {
        let store = MemoryObjectStore::new();
        for v in 1..=3u64 {
            store
                .put_version("certificates", "c1", StoredObject { version: v, value: json!({"v": v}) })
                .await
                .unwrap();
        }
        let history = store.history("certificates", "c1").await.unwrap();
        assert_eq!(history.iter().map(|o| o.version).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn find_by_field_matches_latest_version_only() {
        let store = MemoryObjectStore::new();
        store
            .put_version("trust_relationships", "peer-a", StoredObject { version: 1, value: json!({"peer": "h1", "status": "pending"}) })
            .await
            .unwrap();
        store
            .put_version("trust_relationships", "peer-a", StoredObject { version: 2, value: json!({"peer": "h1", "status": "trusted"}) })
            .await
            .unwrap();
        let matches = store.find_by_field("trust_relationships", "peer", "h1").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value.get("status").unwrap(), "trusted");
    }
}
