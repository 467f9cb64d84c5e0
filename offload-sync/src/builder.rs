//! # Queue Builder
//!
//! Seeds thread queues from the asset catalog.
//!
//! ## Overview
//!
//! A build scans the catalog for enabled media kinds and keeps every asset
//! that carries no error marker, is not already queued, and has outstanding
//! runnable work. Never-synced assets go preferentially to the designated
//! first thread; previously-synced-but-stale assets are chunked evenly
//! across the remaining threads. Tagging an asset replaces any prior owner,
//! so a rebuild cannot leave an item owned by two threads.

use crate::asset::AssetId;
use crate::context::SyncContext;
use crate::error::Result;
use crate::queue::{thread_names_for, BulkQueueState, QueueKind, ThreadCursor};
use crate::repository::{QueueRepository, SyncStateRepository};
use crate::signature::SignatureEngine;
use offload_bridge::catalog::{AssetCatalog, AssetRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Scans the catalog and distributes unsynced assets across thread lanes
pub struct QueueBuilder {
    ctx: Arc<SyncContext>,
    engine: Arc<SignatureEngine>,
}

impl QueueBuilder {
    pub fn new(ctx: Arc<SyncContext>, engine: Arc<SignatureEngine>) -> Self {
        Self { ctx, engine }
    }

    /// Build (or rebuild) a queue from scratch.
    ///
    /// Produces the global queue record and one cursor per thread lane.
    /// Cursors start with a never-claimed heartbeat so a subsequent
    /// `start` sees them as stalled and pokes every lane into action.
    pub async fn build(&self, kind: QueueKind) -> Result<BulkQueueState> {
        let threads = thread_names_for(&self.ctx.config, kind);
        let now = self.ctx.now();

        let mut fresh: Vec<AssetRecord> = Vec::new();
        let mut stale: Vec<AssetRecord> = Vec::new();

        for raw_id in self
            .ctx
            .catalog
            .list_ids(&self.ctx.config.enabled_kinds)
            .await?
        {
            let Some(record) = self.ctx.catalog.get(raw_id).await? else {
                continue;
            };
            let state = self
                .ctx
                .states
                .get_or_default(AssetId::new(raw_id), now)
                .await?;

            if state.has_error() || state.queued_thread.is_some() {
                continue;
            }
            if !self.engine.has_outstanding(&self.ctx, &record, &state).await? {
                continue;
            }

            if state.is_synced() {
                stale.push(record);
            } else {
                fresh.push(record);
            }
        }

        let total = (fresh.len() + stale.len()) as u64;
        let mut assignments: HashMap<String, Vec<AssetId>> = threads
            .iter()
            .map(|t| (t.clone(), Vec::new()))
            .collect();

        // New-to-sync items all land on the first thread.
        for record in &fresh {
            assignments
                .get_mut(&threads[0])
                .expect("first thread exists")
                .push(AssetId::new(record.id));
        }

        // Stale items are chunked evenly across the remaining threads; with
        // a single lane everything shares it.
        let rest: Vec<&String> = if threads.len() > 1 {
            threads[1..].iter().collect()
        } else {
            threads.iter().collect()
        };
        let chunk = stale.len().div_ceil(rest.len().max(1)).max(1);
        for (i, record) in stale.iter().enumerate() {
            let thread = rest[(i / chunk).min(rest.len() - 1)];
            assignments
                .get_mut(thread)
                .expect("thread exists")
                .push(AssetId::new(record.id));
        }

        for (thread, ids) in &assignments {
            for id in ids {
                let mut state = self.ctx.states.get_or_default(*id, now).await?;
                state.tag(thread.clone());
                state.updated_at = now;
                self.ctx.states.upsert(&state).await?;
            }

            let cursor = ThreadCursor {
                thread: thread.clone(),
                next: ids.first().copied(),
                ping: 0,
                pending: ids.len() as u64,
            };
            self.ctx.queues.put_cursor(&cursor).await?;
            debug!(thread = %thread, assigned = ids.len(), "Seeded thread queue");
        }

        let state = BulkQueueState {
            total,
            threads: threads.clone(),
            started_at: now,
            running: self.ctx.queues.is_running(kind).await?,
        };
        self.ctx.queues.put_state(kind, &state).await?;

        info!(
            queue = %kind,
            total = total,
            fresh = fresh.len(),
            stale = stale.len(),
            threads = threads.len(),
            "Queue built"
        );
        Ok(state)
    }

    /// Tag specific assets into a queue, round-robin across its threads.
    ///
    /// Returns how many assets each thread received. Re-tagging removes the
    /// prior owner, so each id ends up owned by exactly one thread.
    pub async fn add_to_queue(
        &self,
        ids: &[AssetId],
        kind: QueueKind,
    ) -> Result<HashMap<String, u64>> {
        let threads = thread_names_for(&self.ctx.config, kind);
        let now = self.ctx.now();
        let mut counts: HashMap<String, u64> =
            threads.iter().map(|t| (t.clone(), 0)).collect();

        let mut lane = 0usize;
        for id in ids {
            if self.ctx.catalog.get(id.get()).await?.is_none() {
                debug!(asset_id = %id, "Skipping queue add for missing asset");
                continue;
            }

            let thread = &threads[lane % threads.len()];
            let mut state = self.ctx.states.get_or_default(*id, now).await?;
            state.tag(thread.clone());
            state.updated_at = now;
            self.ctx.states.upsert(&state).await?;

            *counts.get_mut(thread).expect("thread exists") += 1;
            lane += 1;
        }

        // Refresh cursor pending counts from the tag store; the claim path
        // re-derives too, this keeps reporting honest in between.
        let mut total = 0u64;
        for thread in &threads {
            let mut cursor = self
                .ctx
                .queues
                .get_cursor(thread)
                .await?
                .unwrap_or_else(|| ThreadCursor::new(thread));
            cursor.pending = self.ctx.states.tagged_count(thread).await?;
            total += cursor.pending;
            self.ctx.queues.put_cursor(&cursor).await?;
        }

        let existing = self.ctx.queues.get_state(kind).await?;
        let state = BulkQueueState {
            total,
            threads: threads.clone(),
            started_at: existing.as_ref().map(|s| s.started_at).unwrap_or(now),
            running: existing.map(|s| s.running).unwrap_or(false),
        };
        self.ctx.queues.put_state(kind, &state).await?;

        info!(queue = %kind, added = lane, "Added assets to queue");
        Ok(counts)
    }
}
