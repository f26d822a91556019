//! In-memory implementation of `ItemStore`.
//!
//! All items live in a `HashMap` behind a `RwLock` and are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use shipgate_core::ItemKey;
use tokio::sync::RwLock;

use super::{ItemStore, RepositoryError, StoredItem};

#[derive(Default)]
pub struct InMemoryItemStore {
    items: RwLock<HashMap<ItemKey, StoredItem>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items, expired ones included.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get(&self, key: &ItemKey, now: i64) -> Result<Option<StoredItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(key).filter(|item| !item.is_expired(now)).cloned())
    }

    async fn put(&self, item: StoredItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.key.clone(), item);
        Ok(())
    }

    async fn prune_expired(&self, now: i64) -> Result<usize, RepositoryError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| !item.is_expired(now));
        Ok(before - items.len())
    }
}
