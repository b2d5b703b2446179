use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;

use super::KvStore;

/// Volatile store, used when no data directory is configured.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_entries(
        entries: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        let store = Self::new();
        store.entries.write().await.extend(entries);
        store
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CoreError> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }
}
