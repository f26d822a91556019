//! SQLite implementation of `ItemStore`.
//!
//! # Schema Versioning
//!
//! A `schema_version` table records the schema version. To change the
//! schema, bump `CURRENT_SCHEMA_VERSION` and add a step to
//! `run_migrations()`; steps run in order from the stored version.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use shipgate_core::ItemKey;
use tracing::{info, warn};

use super::{ItemStore, RepositoryError, StoredItem};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed item store.
///
/// rusqlite is synchronous, so every call runs on
/// `tokio::task::spawn_blocking`.
pub struct SqliteItemStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage("lock connection", "connection mutex poisoned"))
}

impl SqliteItemStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        #[cfg(unix)]
        if !is_in_memory {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        if !journal_mode.eq_ignore_ascii_case("wal")
            && !(is_in_memory && journal_mode.eq_ignore_ascii_case("memory"))
        {
            warn!(
                "SQLite kept journal_mode '{}' instead of WAL for {}",
                journal_mode, path_str
            );
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure database", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS items (
                    pk TEXT NOT NULL,
                    sk TEXT NOT NULL,
                    body TEXT NOT NULL,
                    expires_at INTEGER,
                    PRIMARY KEY (pk, sk)
                );

                CREATE INDEX IF NOT EXISTS idx_items_expiry
                    ON items(expires_at) WHERE expires_at IS NOT NULL;
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        info!(
            "Migrated item store schema from v{} to v{}",
            from_version, CURRENT_SCHEMA_VERSION
        );
        Ok(())
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn get(&self, key: &ItemKey, now: i64) -> Result<Option<StoredItem>, RepositoryError> {
        let conn = self.conn.clone();
        let key = key.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let row: Option<(String, Option<i64>)> = conn
                .query_row(
                    "SELECT body, expires_at FROM items
                     WHERE pk = ?1 AND sk = ?2 AND (expires_at IS NULL OR expires_at > ?3)",
                    params![key.pk, key.sk, now],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            match row {
                Some((json, expires_at)) => {
                    let body = serde_json::from_str(&json)
                        .map_err(|_| RepositoryError::corruption("item JSON"))?;
                    Ok(Some(StoredItem {
                        key,
                        body,
                        expires_at,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn put(&self, item: StoredItem) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let body = serde_json::to_string(&item.body)
            .map_err(|e| RepositoryError::storage("serialize item", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.execute(
                "INSERT INTO items (pk, sk, body, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(pk, sk) DO UPDATE SET
                     body = excluded.body,
                     expires_at = excluded.expires_at",
                params![item.key.pk, item.key.sk, body, item.expires_at],
            )
            .map_err(|e| RepositoryError::storage("put", e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put", e.to_string()))?
    }

    async fn prune_expired(&self, now: i64) -> Result<usize, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "DELETE FROM items WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
            .map_err(|e| RepositoryError::storage("prune expired", e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::storage("prune expired", e.to_string()))?
    }
}
