//! # Sync Persistence
//!
//! Repositories for per-asset sync state and queue coordination records.
//!
//! ## Overview
//!
//! Two repositories back the engine:
//! - [`SyncStateRepository`] - one row per asset: signature map, storage
//!   mode, remote identity, queue ownership tag, error marker
//! - [`QueueRepository`] - one cursor row per thread lane plus one global
//!   record per queue kind
//!
//! Both ship SQLite implementations that create their own tables. The
//! claim-path queries (`next_tagged`, `tagged_count`) are covered by an
//! index on the ownership tag so claims stay targeted as the library grows.

use crate::asset::{AssetId, DeliveryType, StorageMode, SyncState};
use crate::error::{Result, SyncError};
use crate::queue::{BulkQueueState, QueueKind, ThreadCursor};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

// ============================================================================
// Repository Traits
// ============================================================================

/// Persistence for per-asset sync state
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Fetch a state record
    async fn get(&self, id: AssetId) -> Result<Option<SyncState>>;

    /// Fetch a state record, or a fresh one stamped with `now`
    async fn get_or_default(&self, id: AssetId, now: i64) -> Result<SyncState> {
        Ok(self
            .get(id)
            .await?
            .unwrap_or_else(|| SyncState::new(id, now)))
    }

    /// Insert or replace a state record
    async fn upsert(&self, state: &SyncState) -> Result<()>;

    /// Delete a state record
    async fn delete(&self, id: AssetId) -> Result<()>;

    /// Assets whose public id hashes to the given reverse-lookup key
    async fn find_by_public_id_hash(&self, hash: &str) -> Result<Vec<AssetId>>;

    /// Lowest-id asset still tagged to a thread
    async fn next_tagged(&self, thread: &str) -> Result<Option<AssetId>>;

    /// Number of assets still tagged to a thread
    async fn tagged_count(&self, thread: &str) -> Result<u64>;

    /// Summed (local, remote) byte sizes across all tracked assets
    async fn size_totals(&self) -> Result<(i64, i64)>;
}

/// Persistence for queue cursors and global queue records
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Fetch one thread cursor
    async fn get_cursor(&self, thread: &str) -> Result<Option<ThreadCursor>>;

    /// Insert or replace a thread cursor
    async fn put_cursor(&self, cursor: &ThreadCursor) -> Result<()>;

    /// All cursors whose thread name starts with `prefix`
    async fn list_cursors(&self, prefix: &str) -> Result<Vec<ThreadCursor>>;

    /// Remove all cursors whose thread name starts with `prefix`
    async fn clear_cursors(&self, prefix: &str) -> Result<()>;

    /// Fetch a queue's global record
    async fn get_state(&self, kind: QueueKind) -> Result<Option<BulkQueueState>>;

    /// Insert or replace a queue's global record
    async fn put_state(&self, kind: QueueKind, state: &BulkQueueState) -> Result<()>;

    /// Toggle a queue's global running flag
    async fn set_running(&self, kind: QueueKind, running: bool) -> Result<()>;

    /// Read a queue's global running flag; absent record reads as stopped
    async fn is_running(&self, kind: QueueKind) -> Result<bool>;
}

// ============================================================================
// SQLite: Sync State
// ============================================================================

/// SQLite implementation of [`SyncStateRepository`]
pub struct SqliteSyncStateRepository {
    pool: SqlitePool,
}

impl SqliteSyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize tables and indexes if they don't exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                asset_id INTEGER PRIMARY KEY,
                signatures TEXT NOT NULL,
                storage_mode TEXT NOT NULL,
                mode_requested_at INTEGER,
                public_id TEXT,
                public_id_hash TEXT,
                version INTEGER,
                delivery_type TEXT,
                downloading INTEGER NOT NULL DEFAULT 0,
                unsync_requested INTEGER NOT NULL DEFAULT 0,
                queued_thread TEXT,
                sync_error TEXT,
                local_size INTEGER,
                remote_size INTEGER,
                folder_synced INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sync_state_queued_thread
            ON sync_state(queued_thread, asset_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sync_state_public_id_hash
            ON sync_state(public_id_hash)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncState> {
        let signatures: HashMap<String, String> =
            serde_json::from_str(&row.get::<String, _>("signatures"))
                .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let delivery_type = row
            .get::<Option<String>, _>("delivery_type")
            .map(|s| s.parse::<DeliveryType>())
            .transpose()?;

        Ok(SyncState {
            asset_id: AssetId::new(row.get("asset_id")),
            signatures,
            storage_mode: row.get::<String, _>("storage_mode").parse::<StorageMode>()?,
            mode_requested_at: row.get("mode_requested_at"),
            public_id: row.get("public_id"),
            public_id_hash: row.get("public_id_hash"),
            version: row.get("version"),
            delivery_type,
            downloading: row.get::<i64, _>("downloading") != 0,
            unsync_requested: row.get::<i64, _>("unsync_requested") != 0,
            queued_thread: row.get("queued_thread"),
            sync_error: row.get("sync_error"),
            local_size: row.get("local_size"),
            remote_size: row.get("remote_size"),
            folder_synced: row.get::<i64, _>("folder_synced") != 0,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SyncStateRepository for SqliteSyncStateRepository {
    async fn get(&self, id: AssetId) -> Result<Option<SyncState>> {
        let row = sqlx::query("SELECT * FROM sync_state WHERE asset_id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(|r| Self::map_row(&r)).transpose()
    }

    async fn upsert(&self, state: &SyncState) -> Result<()> {
        let signatures = serde_json::to_string(&state.signatures)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_state (
                asset_id, signatures, storage_mode, mode_requested_at,
                public_id, public_id_hash, version, delivery_type,
                downloading, unsync_requested, queued_thread, sync_error,
                local_size, remote_size, folder_synced, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(state.asset_id.get())
        .bind(signatures)
        .bind(state.storage_mode.as_str())
        .bind(state.mode_requested_at)
        .bind(&state.public_id)
        .bind(&state.public_id_hash)
        .bind(state.version)
        .bind(state.delivery_type.map(|d| d.as_str()))
        .bind(state.downloading as i64)
        .bind(state.unsync_requested as i64)
        .bind(&state.queued_thread)
        .bind(&state.sync_error)
        .bind(state.local_size)
        .bind(state.remote_size)
        .bind(state.folder_synced as i64)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: AssetId) -> Result<()> {
        sqlx::query("DELETE FROM sync_state WHERE asset_id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_by_public_id_hash(&self, hash: &str) -> Result<Vec<AssetId>> {
        let rows = sqlx::query(
            "SELECT asset_id FROM sync_state WHERE public_id_hash = ? ORDER BY asset_id ASC",
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|r| AssetId::new(r.get("asset_id")))
            .collect())
    }

    async fn next_tagged(&self, thread: &str) -> Result<Option<AssetId>> {
        let row = sqlx::query(
            "SELECT asset_id FROM sync_state WHERE queued_thread = ? ORDER BY asset_id ASC LIMIT 1",
        )
        .bind(thread)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(row.map(|r| AssetId::new(r.get("asset_id"))))
    }

    async fn tagged_count(&self, thread: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_state WHERE queued_thread = ?")
                .bind(thread)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn size_totals(&self) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(local_size), 0) AS local_total,
                   COALESCE(SUM(remote_size), 0) AS remote_total
            FROM sync_state
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok((row.get("local_total"), row.get("remote_total")))
    }
}

// ============================================================================
// SQLite: Queue
// ============================================================================

/// SQLite implementation of [`QueueRepository`]
pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize tables if they don't exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_cursors (
                thread TEXT PRIMARY KEY,
                next_id INTEGER,
                ping INTEGER NOT NULL DEFAULT 0,
                pending INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_state (
                kind TEXT PRIMARY KEY,
                total INTEGER NOT NULL DEFAULT 0,
                threads TEXT NOT NULL,
                started_at INTEGER NOT NULL DEFAULT 0,
                running INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_cursor(row: &sqlx::sqlite::SqliteRow) -> ThreadCursor {
        ThreadCursor {
            thread: row.get("thread"),
            next: row
                .get::<Option<i64>, _>("next_id")
                .map(AssetId::new),
            ping: row.get("ping"),
            pending: row.get::<i64, _>("pending") as u64,
        }
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn get_cursor(&self, thread: &str) -> Result<Option<ThreadCursor>> {
        let row = sqlx::query("SELECT * FROM queue_cursors WHERE thread = ?")
            .bind(thread)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(row.map(|r| Self::map_cursor(&r)))
    }

    async fn put_cursor(&self, cursor: &ThreadCursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO queue_cursors (thread, next_id, ping, pending)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&cursor.thread)
        .bind(cursor.next.map(|id| id.get()))
        .bind(cursor.ping)
        .bind(cursor.pending as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_cursors(&self, prefix: &str) -> Result<Vec<ThreadCursor>> {
        let pattern = format!("{}%", prefix);
        let rows = sqlx::query(
            "SELECT * FROM queue_cursors WHERE thread LIKE ? ORDER BY thread ASC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::map_cursor).collect())
    }

    async fn clear_cursors(&self, prefix: &str) -> Result<()> {
        let pattern = format!("{}%", prefix);
        sqlx::query("DELETE FROM queue_cursors WHERE thread LIKE ?")
            .bind(pattern)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_state(&self, kind: QueueKind) -> Result<Option<BulkQueueState>> {
        let row = sqlx::query("SELECT * FROM queue_state WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(|r| {
            let threads: Vec<String> = serde_json::from_str(&r.get::<String, _>("threads"))
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            Ok(BulkQueueState {
                total: r.get::<i64, _>("total") as u64,
                threads,
                started_at: r.get("started_at"),
                running: r.get::<i64, _>("running") != 0,
            })
        })
        .transpose()
    }

    async fn put_state(&self, kind: QueueKind, state: &BulkQueueState) -> Result<()> {
        let threads = serde_json::to_string(&state.threads)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO queue_state (kind, total, threads, started_at, running)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind.as_str())
        .bind(state.total as i64)
        .bind(threads)
        .bind(state.started_at)
        .bind(state.running as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn set_running(&self, kind: QueueKind, running: bool) -> Result<()> {
        // Keep a record even if the queue was never built; a bare running
        // flag with zero totals is valid.
        sqlx::query(
            r#"
            INSERT INTO queue_state (kind, total, threads, started_at, running)
            VALUES (?, 0, '[]', 0, ?)
            ON CONFLICT(kind) DO UPDATE SET running = excluded.running
            "#,
        )
        .bind(kind.as_str())
        .bind(running as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn is_running(&self, kind: QueueKind) -> Result<bool> {
        let running: Option<i64> =
            sqlx::query_scalar("SELECT running FROM queue_state WHERE kind = ?")
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(running.unwrap_or(0) != 0)
    }
}
