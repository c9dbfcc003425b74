//! Durable `(workflow_id, tag) -> hash` mapping.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::StoreError;

/// Durable mapping from `(workflowId, tag)` to `hash`, as consumed by the
/// resolver. Append-only from the resolver's perspective: it never reads
/// during `Running`, and it never writes the same `(workflow_id, tag)`
/// twice (a tag leaves `PendingSet` before its `StorePutOk`/`StorePutFailed`
/// reaction runs, and `ResolvedMap` is only ever populated once per tag).
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_all(&self, workflow_id: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn put(&self, workflow_id: &str, tag: &str, hash: &str) -> Result<(), StoreError>;
}

/// SQLite-backed `Store`, grounded in the rest of the workspace's sqlx
/// query style.
///
/// The primary key `(workflow_id, tag)` is deliberately not unique: a
/// restart only needs a deterministic reconstruction, and "last write
/// wins" (by `created_at`) is enough, since the resolver itself never
/// double-writes a tag.
pub struct SqlxStore {
    pool: SqlitePool,
}

impl SqlxStore {
    /// Connect to (and initialize the schema of) a SQLite database.
    ///
    /// A single connection is kept open: an in-memory URL (`sqlite::memory:`)
    /// would otherwise hand out a fresh, empty database per pooled
    /// connection, and the resolver's own write volume never benefits from
    /// concurrent writers against one SQLite file anyway.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an already-configured pool (e.g. shared with other state).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resolved_image_hashes (
                workflow_id TEXT NOT NULL,
                tag         TEXT NOT NULL,
                hash        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_resolved_image_hashes_workflow \
             ON resolved_image_hashes (workflow_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqlxStore {
    async fn load_all(&self, workflow_id: &str) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query(
            "SELECT tag, hash FROM resolved_image_hashes \
             WHERE workflow_id = ? ORDER BY created_at ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let tag: String = row.get("tag");
            let hash: String = row.get("hash");
            // Later rows overwrite earlier ones: last write wins.
            out.insert(tag, hash);
        }
        debug!(workflow_id, loaded = out.len(), "loaded persisted image hashes");
        Ok(out)
    }

    async fn put(&self, workflow_id: &str, tag: &str, hash: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO resolved_image_hashes (workflow_id, tag, hash, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(workflow_id)
        .bind(tag)
        .bind(hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_load_all_round_trips() {
        let store = SqlxStore::connect("sqlite::memory:").await.unwrap();
        store.put("wf-1", "ubuntu:18.04", "sha256:aaa").await.unwrap();
        store.put("wf-1", "alpine:3.18", "sha256:bbb").await.unwrap();
        store.put("wf-2", "ubuntu:18.04", "sha256:ccc").await.unwrap();

        let loaded = store.load_all("wf-1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("ubuntu:18.04").map(String::as_str), Some("sha256:aaa"));
        assert_eq!(loaded.get("alpine:3.18").map(String::as_str), Some("sha256:bbb"));
    }

    #[tokio::test]
    async fn later_row_for_same_tag_wins() {
        let store = SqlxStore::connect("sqlite::memory:").await.unwrap();
        store.put("wf-1", "ubuntu:18.04", "sha256:old").await.unwrap();
        store.put("wf-1", "ubuntu:18.04", "sha256:new").await.unwrap();

        let loaded = store.load_all("wf-1").await.unwrap();
        assert_eq!(loaded.get("ubuntu:18.04").map(String::as_str), Some("sha256:new"));
    }

    #[tokio::test]
    async fn empty_workflow_loads_empty_map() {
        let store = SqlxStore::connect("sqlite::memory:").await.unwrap();
        let loaded = store.load_all("no-such-workflow").await.unwrap();
        assert!(loaded.is_empty());
    }
}
