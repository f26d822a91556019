//! Persistence for deployment records and the approver registry.
//!
//! Storage is a plain key-value table addressed by `(pk, sk)` with an
//! optional expiry. `ItemStore` abstracts the backend; `RecordStore` layers
//! the typed operations on top of it.

mod memory;
mod sqlite;

pub use memory::InMemoryItemStore;
pub use sqlite::SqliteItemStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use shipgate_core::{ApproverRegistry, DeploymentRecord, ItemKey, RecordKey};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    #[error("stored {what} could not be decoded")]
    Corruption { what: &'static str },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }
}

/// One stored item.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub key: ItemKey,
    pub body: serde_json::Value,
    /// Unix seconds after which the item is treated as absent.
    pub expires_at: Option<i64>,
}

impl StoredItem {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value backend.
///
/// Reads must observe earlier writes to the same key. Writes are plain
/// upserts; there is no conditional write.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Get a live item, `None` if absent or expired at `now`.
    async fn get(&self, key: &ItemKey, now: i64) -> Result<Option<StoredItem>, RepositoryError>;

    /// Insert or replace an item.
    async fn put(&self, item: StoredItem) -> Result<(), RepositoryError>;

    /// Drop items that expired at or before `now`, returning how many went.
    async fn prune_expired(&self, now: i64) -> Result<usize, RepositoryError>;
}

/// Typed access to records and the registry.
#[derive(Clone)]
pub struct RecordStore {
    items: Arc<dyn ItemStore>,
    history_ttl: Duration,
}

impl RecordStore {
    pub fn new(items: Arc<dyn ItemStore>, history_ttl: Duration) -> Self {
        Self { items, history_ttl }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryItemStore::new()), Duration::days(90))
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: &ItemKey,
        what: &'static str,
    ) -> Result<Option<T>, RepositoryError> {
        match self.items.get(key, Utc::now().timestamp()).await? {
            Some(item) => serde_json::from_value(item.body)
                .map(Some)
                .map_err(|_| RepositoryError::corruption(what)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: ItemKey,
        value: &T,
        expires_at: Option<i64>,
    ) -> Result<(), RepositoryError> {
        let body = serde_json::to_value(value)
            .map_err(|e| RepositoryError::storage("serialize item", e.to_string()))?;
        self.items
            .put(StoredItem {
                key,
                body,
                expires_at,
            })
            .await
    }

    pub async fn get_latest(
        &self,
        key: &RecordKey,
    ) -> Result<Option<DeploymentRecord>, RepositoryError> {
        self.read(&ItemKey::latest(key), "deployment record").await
    }

    pub async fn put_latest(&self, record: &DeploymentRecord) -> Result<(), RepositoryError> {
        debug!(
            "Storing latest record for {} (deployment {})",
            record.key(),
            record.deployment_id
        );
        self.write(ItemKey::latest(&record.key()), record, None)
            .await
    }

    /// Write `record` to its history slot, expiring after the configured TTL.
    pub async fn archive(&self, record: &DeploymentRecord) -> Result<(), RepositoryError> {
        let expires_at = (Utc::now() + self.history_ttl).timestamp();
        debug!(
            "Archiving deployment {} for {}",
            record.deployment_id,
            record.key()
        );
        self.write(
            ItemKey::history(&record.key(), record.deployment_id),
            record,
            Some(expires_at),
        )
        .await
    }

    pub async fn get_history(
        &self,
        key: &RecordKey,
        deployment_id: u64,
    ) -> Result<Option<DeploymentRecord>, RepositoryError> {
        self.read(&ItemKey::history(key, deployment_id), "archived record")
            .await
    }

    pub async fn get_approvers(&self) -> Result<Option<ApproverRegistry>, RepositoryError> {
        self.read(&ItemKey::approvers(), "approver registry").await
    }

    pub async fn put_approvers(&self, registry: &ApproverRegistry) -> Result<(), RepositoryError> {
        self.write(ItemKey::approvers(), registry, None).await
    }

    pub async fn prune_expired(&self) -> Result<usize, RepositoryError> {
        self.items.prune_expired(Utc::now().timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipgate_core::{ApprovalState, Approver, DeploymentStatus};

    fn record(environment: &str, deployment_id: u64) -> DeploymentRecord {
        DeploymentRecord {
            repository: "blog".to_string(),
            owner: "octo".to_string(),
            environment: environment.to_string(),
            deployment_id,
            status: DeploymentStatus::Success,
            branch: "main".to_string(),
            sha: "abc1234".to_string(),
            author: "octocat".to_string(),
            target_url: String::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            approval: ApprovalState::AwaitingApproval,
            message: None,
            blocks: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_latest_is_per_pair() {
        let store = RecordStore::in_memory();
        store.put_latest(&record("dev", 1)).await.unwrap();
        store.put_latest(&record("test", 2)).await.unwrap();

        let dev = store
            .get_latest(&RecordKey::new("blog", "dev"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dev.deployment_id, 1);
        assert!(store
            .get_latest(&RecordKey::new("blog", "prod"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_archive_keeps_latest_untouched() {
        let store = RecordStore::in_memory();
        store.put_latest(&record("dev", 1)).await.unwrap();
        store.archive(&record("dev", 1)).await.unwrap();
        store.put_latest(&record("dev", 2)).await.unwrap();

        let key = RecordKey::new("blog", "dev");
        assert_eq!(
            store.get_latest(&key).await.unwrap().unwrap().deployment_id,
            2
        );
        assert!(store.get_history(&key, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_history_is_invisible() {
        let store = RecordStore::new(Arc::new(InMemoryItemStore::new()), Duration::seconds(-1));
        store.archive(&record("dev", 1)).await.unwrap();

        let key = RecordKey::new("blog", "dev");
        assert!(store.get_history(&key, 1).await.unwrap().is_none());
        assert_eq!(store.prune_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_approvers_round_trip() {
        let store = RecordStore::in_memory();
        assert!(store.get_approvers().await.unwrap().is_none());

        let mut registry = ApproverRegistry::new();
        registry.add(
            "U1",
            Approver {
                id: "U1".to_string(),
                name: "Ada".to_string(),
                image: "https://avatars.example/ada.png".to_string(),
                email: None,
            },
        );
        store.put_approvers(&registry).await.unwrap();

        assert_eq!(store.get_approvers().await.unwrap(), Some(registry));
    }
}
