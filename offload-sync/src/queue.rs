//! # Thread/Queue Manager
//!
//! Persisted per-thread cursors and the claim protocol.
//!
//! ## Overview
//!
//! Each queue kind (bulk, autosync) owns a fixed set of named thread lanes.
//! A thread's persisted cursor carries the cached next id, the heartbeat of
//! its last claim, and the count of items still tagged to it. Thread states
//! are derived on demand, never stored.
//!
//! ## Claim protocol
//!
//! [`QueueManager::claim_next`] only returns an id while the queue's global
//! running flag is set. It re-derives the cached `next` and the pending
//! count with targeted queries, pops `next`, zeroes it, stamps the
//! heartbeat, and returns the popped value. The read-then-clear is not
//! atomic across processes; duplicate claims are accepted and made harmless
//! by signature-gated handlers. The ownership tag persists until the item
//! is actually processed, so a claim lost to a crash resurfaces on the next
//! call.

use crate::asset::AssetId;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::repository::{QueueRepository, SyncStateRepository};
use offload_bridge::background::{BackgroundDispatcher, DispatchRequest};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Queue Kind
// ============================================================================

/// Queue category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Manually started full sync
    Bulk,
    /// Continuous background sync of new and changed assets
    Auto,
}

impl QueueKind {
    pub const ALL: [QueueKind; 2] = [QueueKind::Bulk, QueueKind::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Auto => "auto",
        }
    }

    /// Name of one of this queue's thread lanes
    pub fn thread_name(&self, index: usize) -> String {
        format!("queue_{}_thread_{}", self.as_str(), index)
    }

    /// Prefix every thread lane of this queue shares
    pub fn thread_prefix(&self) -> String {
        format!("queue_{}_thread_", self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bulk" => Ok(Self::Bulk),
            "auto" => Ok(Self::Auto),
            _ => Err(SyncError::InvalidQueueKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Thread Cursor & Derived State
// ============================================================================

/// Persisted per-thread cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCursor {
    /// Thread lane name, e.g. `queue_bulk_thread_0`
    pub thread: String,
    /// Cached next id to claim; zeroed on every claim
    pub next: Option<AssetId>,
    /// Unix timestamp of the last claim (heartbeat)
    pub ping: i64,
    /// Items still tagged to this thread
    pub pending: u64,
}

impl ThreadCursor {
    /// Fresh cursor with a never-claimed heartbeat
    pub fn new(thread: impl Into<String>) -> Self {
        Self {
            thread: thread.into(),
            next: None,
            ping: 0,
            pending: 0,
        }
    }
}

/// Derived thread state; computed from the cursor, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadState {
    /// The queue category's enable flag is off
    Disabled,
    /// No next id and no pending count
    Ended,
    /// Heartbeat within the staleness window
    Active,
    /// Heartbeat stale while the queue is marked running
    Stalled,
}

impl ThreadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Ended => "ended",
            Self::Active => "active",
            Self::Stalled => "stalled",
        }
    }

    /// Derive a thread's state from its cursor and queue context
    pub fn derive(
        cursor: &ThreadCursor,
        enabled: bool,
        running: bool,
        now: i64,
        staleness_secs: i64,
    ) -> Self {
        if !enabled {
            return Self::Disabled;
        }
        if cursor.next.is_none() && cursor.pending == 0 {
            return Self::Ended;
        }
        if now.saturating_sub(cursor.ping) <= staleness_secs {
            return Self::Active;
        }
        if running {
            return Self::Stalled;
        }
        Self::Ended
    }
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Bulk Queue State
// ============================================================================

/// Global per-queue record, independent of per-thread cursors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkQueueState {
    /// Total items seeded into the queue
    pub total: u64,
    /// Thread lanes the queue was built with
    pub threads: Vec<String>,
    /// Unix timestamp the queue was built
    pub started_at: i64,
    /// Global running flag
    pub running: bool,
}

/// Point-in-time view of one queue for reporting
#[derive(Debug, Clone, Serialize)]
pub struct ThreadStatus {
    pub name: String,
    pub state: ThreadState,
    pub pending: u64,
    pub next: Option<AssetId>,
    pub ping: i64,
}

/// Snapshot returned by `get_queue`
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub kind: QueueKind,
    pub running: bool,
    pub total: u64,
    pub started_at: Option<i64>,
    pub threads: Vec<ThreadStatus>,
}

// ============================================================================
// Queue Manager
// ============================================================================

/// Thread lane names a queue kind is configured with
pub fn thread_names_for(config: &crate::context::SyncConfig, kind: QueueKind) -> Vec<String> {
    let count = match kind {
        QueueKind::Bulk => config.bulk_threads,
        QueueKind::Auto => config.auto_threads,
    };
    (0..count.max(1)).map(|i| kind.thread_name(i)).collect()
}

/// Cursor persistence plus the claim/start/stop protocol
pub struct QueueManager {
    ctx: Arc<SyncContext>,
}

impl QueueManager {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Thread lane names configured for a queue kind
    pub fn thread_names(&self, kind: QueueKind) -> Vec<String> {
        thread_names_for(&self.ctx.config, kind)
    }

    /// Whether a queue category is enabled at all
    pub fn kind_enabled(&self, kind: QueueKind) -> bool {
        match kind {
            QueueKind::Bulk => self.ctx.config.bulk_enabled,
            QueueKind::Auto => self.ctx.config.autosync_enabled,
        }
    }

    pub async fn is_running(&self, kind: QueueKind) -> Result<bool> {
        self.ctx.queues.is_running(kind).await
    }

    /// Set the global running flag and poke every currently stalled thread
    pub async fn start(&self, kind: QueueKind) -> Result<()> {
        if !self.kind_enabled(kind) {
            debug!(queue = %kind, "Queue category disabled, not starting");
            return Ok(());
        }

        self.ctx.queues.set_running(kind, true).await?;
        info!(queue = %kind, "Queue started");

        for (cursor, state) in self.thread_states(kind).await? {
            if state == ThreadState::Stalled {
                self.ctx
                    .dispatcher
                    .dispatch(DispatchRequest::run_thread(kind.as_str(), &cursor.thread))
                    .await?;
            }
        }
        Ok(())
    }

    /// Clear the global running flag
    pub async fn stop(&self, kind: QueueKind) -> Result<()> {
        self.ctx.queues.set_running(kind, false).await?;
        info!(queue = %kind, "Queue stopped");
        Ok(())
    }

    /// Claim the next id for a thread.
    ///
    /// Returns `None` when the queue is not running or the thread has no
    /// tagged work left. Single-claim, not cross-process-atomic.
    pub async fn claim_next(&self, kind: QueueKind, thread: &str) -> Result<Option<AssetId>> {
        if !self.ctx.queues.is_running(kind).await? {
            return Ok(None);
        }

        let mut cursor = self
            .ctx
            .queues
            .get_cursor(thread)
            .await?
            .unwrap_or_else(|| ThreadCursor::new(thread));

        // Re-derive the cached next when empty. The tag persists until the
        // item is processed, so a claim lost to a crash resurfaces here.
        if cursor.next.is_none() {
            cursor.next = self.ctx.states.next_tagged(thread).await?;
        }

        let claimed = cursor.next.take();
        cursor.ping = self.ctx.now();
        cursor.pending = self.ctx.states.tagged_count(thread).await?;
        self.ctx.queues.put_cursor(&cursor).await?;

        if let Some(id) = claimed {
            debug!(thread = %thread, asset_id = %id, "Claimed asset");
        }
        Ok(claimed)
    }

    /// Cursors plus derived states for every thread lane of a queue
    pub async fn thread_states(
        &self,
        kind: QueueKind,
    ) -> Result<Vec<(ThreadCursor, ThreadState)>> {
        let enabled = self.kind_enabled(kind);
        let running = self.is_running(kind).await?;
        let now = self.ctx.now();

        let mut result = Vec::new();
        for name in self.thread_names(kind) {
            let cursor = self
                .ctx
                .queues
                .get_cursor(&name)
                .await?
                .unwrap_or_else(|| ThreadCursor::new(&name));
            let state = ThreadState::derive(
                &cursor,
                enabled,
                running,
                now,
                self.ctx.config.staleness_secs,
            );
            result.push((cursor, state));
        }
        Ok(result)
    }

    /// Whether every thread lane of a queue is out of work
    pub async fn drained(&self, kind: QueueKind) -> Result<bool> {
        for name in self.thread_names(kind) {
            if let Some(cursor) = self.ctx.queues.get_cursor(&name).await? {
                if cursor.next.is_some() || cursor.pending > 0 {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Point-in-time snapshot for reporting
    pub async fn snapshot(&self, kind: QueueKind) -> Result<QueueSnapshot> {
        let state = self.ctx.queues.get_state(kind).await?;
        let running = self.is_running(kind).await?;
        let threads = self
            .thread_states(kind)
            .await?
            .into_iter()
            .map(|(cursor, state)| ThreadStatus {
                name: cursor.thread.clone(),
                state,
                pending: cursor.pending,
                next: cursor.next,
                ping: cursor.ping,
            })
            .collect();

        Ok(QueueSnapshot {
            kind,
            running,
            total: state.as_ref().map(|s| s.total).unwrap_or(0),
            started_at: state.map(|s| s.started_at),
            threads,
        })
    }
}
