//! # Worker Dispatcher
//!
//! Per-invocation processing loop over one thread lane.
//!
//! ## Overview
//!
//! Each invocation claims ids from its lane, runs the full per-asset pass
//! (next outstanding sync type → handler → record outcome, until nothing is
//! outstanding), and advances. The loop is bounded by the configured batch
//! cap so a single invocation respects host execution-time limits; the
//! system has no other backpressure mechanism.
//!
//! Two guards keep the loop finite:
//! - the same sync type never runs twice within one per-asset pass;
//! - the same id claimed twice consecutively is force-untagged with a
//!   "sync loop detected" error instead of being retried forever.
//!
//! Handlers never propagate remote failures across this boundary. Every
//! failure becomes a persisted error marker plus a failure-shaped outcome;
//! `Err` out of a pass means infrastructure trouble, which background runs
//! log and foreground calls surface to the user.

use crate::asset::{AssetId, OutcomeMap, SyncOutcome};
use crate::builder::QueueBuilder;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::queue::{QueueKind, QueueManager};
use crate::registry::SyncOperation;
use crate::repository::SyncStateRepository;
use crate::signature::SignatureEngine;
use offload_bridge::background::{BackgroundDispatcher, DispatchRequest};
use offload_bridge::catalog::AssetCatalog;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error text stamped by the repeated-claim guard
pub const SYNC_LOOP_ERROR: &str = "sync loop detected";

/// What one dispatch invocation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ids claimed, including repeated claims caught by the loop guard
    pub claims: u64,
    /// Assets fully processed
    pub processed: u64,
    /// Whether this invocation found the queue drained and rebuilt it
    pub rebuilt: bool,
}

/// Claims and processes queued assets for one thread lane at a time
pub struct WorkerDispatcher {
    ctx: Arc<SyncContext>,
    engine: Arc<SignatureEngine>,
    manager: Arc<QueueManager>,
    builder: Arc<QueueBuilder>,
}

impl WorkerDispatcher {
    pub fn new(
        ctx: Arc<SyncContext>,
        engine: Arc<SignatureEngine>,
        manager: Arc<QueueManager>,
        builder: Arc<QueueBuilder>,
    ) -> Self {
        Self {
            ctx,
            engine,
            manager,
            builder,
        }
    }

    /// Run one bounded batch over a thread lane.
    ///
    /// After the batch: if this lane and all sibling lanes are drained, the
    /// queue is stopped, rebuilt, and restarted to catch newly arrived
    /// items. An autosync lane that exhausted its cap with work remaining
    /// requests a follow-up invocation; anything else waits for the next
    /// background trigger.
    pub async fn run_thread(&self, kind: QueueKind, thread: &str) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut last_claimed: Option<AssetId> = None;
        let cap = self.ctx.config.batch_cap.max(1);

        debug!(queue = %kind, thread = %thread, "Worker pass starting");

        for _ in 0..cap {
            let Some(id) = self.manager.claim_next(kind, thread).await? else {
                break;
            };
            summary.claims += 1;

            if last_claimed == Some(id) {
                // Repeated consecutive claim: the previous pass failed to
                // release the tag. Force-clear it and stamp the loop error
                // so the id is never auto-retried.
                warn!(asset_id = %id, thread = %thread, "Repeated claim, clearing tag");
                let now = self.ctx.now();
                let mut state = self.ctx.states.get_or_default(id, now).await?;
                state.untag();
                state.record_error(SYNC_LOOP_ERROR);
                state.updated_at = now;
                self.ctx.states.upsert(&state).await?;
                continue;
            }
            last_claimed = Some(id);

            match self.process_asset(id).await {
                Ok(outcomes) => {
                    summary.processed += 1;
                    debug!(
                        asset_id = %id,
                        types_run = outcomes.len(),
                        "Asset pass complete"
                    );
                }
                Err(e) => {
                    // Background path: log and move on. The tag survives a
                    // transient fault and the loop guard catches a
                    // persistent one.
                    error!(asset_id = %id, error = %e, "Asset pass failed");
                }
            }
        }

        if self.manager.is_running(kind).await? {
            if self.manager.drained(kind).await? {
                info!(queue = %kind, "All threads drained; rebuilding queue");
                self.manager.stop(kind).await?;
                self.builder.build(kind).await?;
                self.manager.start(kind).await?;
                summary.rebuilt = true;
            } else if kind == QueueKind::Auto && summary.claims as usize >= cap {
                // Autosync keeps itself alive across host kill windows by
                // chaining bounded invocations while work remains.
                self.ctx
                    .dispatcher
                    .dispatch(DispatchRequest::run_thread(kind.as_str(), thread))
                    .await?;
            }
        }

        Ok(summary)
    }

    /// Run the full per-asset pass: every outstanding sync type in
    /// ascending priority order, each at most once.
    ///
    /// Completion always releases the queue tag, success or failure; the
    /// error marker, not the tag, is what excludes a failed asset from
    /// future dispatch.
    pub async fn process_asset(&self, id: AssetId) -> Result<OutcomeMap> {
        let now = self.ctx.now();

        let Some(record) = self.ctx.catalog.get(id.get()).await? else {
            // The host no longer has the asset; drop the tag so the lane
            // can drain.
            if let Some(mut state) = self.ctx.states.get(id).await? {
                state.untag();
                state.updated_at = now;
                self.ctx.states.upsert(&state).await?;
            }
            return Err(SyncError::AssetNotFound(id));
        };

        let mut state = self.ctx.states.get_or_default(id, now).await?;
        let mut outcomes = OutcomeMap::new();
        let mut ran: HashSet<&'static str> = HashSet::new();

        loop {
            let Some(slug) = self
                .engine
                .next_sync_type(&self.ctx, &record, &mut state)
                .await?
            else {
                break;
            };

            if !ran.insert(slug) {
                // A handler left its signature stale; one attempt per type
                // per pass is the contract.
                debug!(asset_id = %id, sync_type = slug, "Type still outstanding after run, ending pass");
                break;
            }

            let op = self.engine.registry().get(slug)?;
            match op.sync(&self.ctx, &record, &mut state).await {
                Ok(outcome) => {
                    match &outcome {
                        SyncOutcome::Synced { signature } => {
                            state.set_signature(slug, signature.clone());
                        }
                        SyncOutcome::Failed { error } => {
                            state.record_error(error.clone());
                        }
                        SyncOutcome::Skipped => {}
                    }
                    debug!(asset_id = %id, sync_type = slug, outcome = ?outcome, "Sync type finished");
                    outcomes.insert(slug.to_string(), outcome);
                }
                Err(e) => {
                    // Infrastructure fault: persist progress, then surface.
                    state.updated_at = self.ctx.now();
                    self.ctx.states.upsert(&state).await?;
                    return Err(e);
                }
            }

            if state.has_error() {
                // The error marker excludes this asset from further
                // dispatch until cleared.
                break;
            }
        }

        state.untag();
        state.updated_at = self.ctx.now();
        self.ctx.states.upsert(&state).await?;
        Ok(outcomes)
    }
}
