//! # Offload Coordinator
//!
//! The engine's public surface.
//!
//! ## Overview
//!
//! The coordinator wires the signature engine, queue manager, queue
//! builder, worker dispatcher, and health monitor over one shared
//! [`SyncContext`], and exposes the operations hosts call:
//! start/stop/inspect queues, add assets, process assets in the
//! foreground, and per-asset actions (clear error, bypass, storage mode,
//! download, unsync, delete).
//!
//! It also implements [`DispatchHandler`], so a host dispatcher can route
//! background run requests straight back into the engine.
//!
//! ## Usage
//!
//! ```ignore
//! use offload_sync::{OffloadCoordinator, SyncContext};
//! use std::sync::Arc;
//!
//! # async fn example(ctx: Arc<SyncContext>) -> offload_sync::Result<()> {
//! let coordinator = Arc::new(OffloadCoordinator::new(ctx));
//! coordinator.install_monitor().await?;
//!
//! coordinator.start_queue(offload_sync::QueueKind::Bulk).await?;
//! let snapshot = coordinator.get_queue(offload_sync::QueueKind::Bulk).await?;
//! println!("{} items queued", snapshot.total);
//! # Ok(())
//! # }
//! ```

use crate::asset::{AssetId, OutcomeMap, StorageMode};
use crate::builder::QueueBuilder;
use crate::context::SyncContext;
use crate::dispatcher::{RunSummary, WorkerDispatcher};
use crate::error::{Result, SyncError};
use crate::monitor::HealthMonitor;
use crate::queue::{QueueKind, QueueManager, QueueSnapshot};
use crate::registry::{SyncOperation, SyncRegistry};
use crate::repository::{QueueRepository, SyncStateRepository};
use crate::signature::SignatureEngine;
use async_trait::async_trait;
use offload_bridge::background::{DispatchHandler, DispatchRequest};
use offload_bridge::catalog::AssetCatalog;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Library-wide byte accounting from the size sync type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeTotals {
    pub local_bytes: i64,
    pub remote_bytes: i64,
}

/// Central entry point owning all engine components
pub struct OffloadCoordinator {
    ctx: Arc<SyncContext>,
    engine: Arc<SignatureEngine>,
    manager: Arc<QueueManager>,
    builder: Arc<QueueBuilder>,
    dispatcher: Arc<WorkerDispatcher>,
    monitor: Arc<HealthMonitor>,
}

impl OffloadCoordinator {
    /// Create a coordinator with the standard sync type registry
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self::with_registry(ctx, SyncRegistry::standard())
    }

    /// Create a coordinator with a custom registry
    pub fn with_registry(ctx: Arc<SyncContext>, registry: SyncRegistry) -> Self {
        let engine = Arc::new(SignatureEngine::new(Arc::new(registry)));
        let manager = Arc::new(QueueManager::new(Arc::clone(&ctx)));
        let builder = Arc::new(QueueBuilder::new(Arc::clone(&ctx), Arc::clone(&engine)));
        let dispatcher = Arc::new(WorkerDispatcher::new(
            Arc::clone(&ctx),
            Arc::clone(&engine),
            Arc::clone(&manager),
            Arc::clone(&builder),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&ctx),
            Arc::clone(&manager),
            Arc::clone(&builder),
        ));

        Self {
            ctx,
            engine,
            manager,
            builder,
            dispatcher,
            monitor,
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub fn engine(&self) -> &Arc<SignatureEngine> {
        &self.engine
    }

    pub fn manager(&self) -> &Arc<QueueManager> {
        &self.manager
    }

    pub fn builder(&self) -> &Arc<QueueBuilder> {
        &self.builder
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Register the periodic health check with the host scheduler
    pub async fn install_monitor(&self) -> Result<()> {
        Arc::clone(&self.monitor).install().await
    }

    // ========================================================================
    // Queue surface
    // ========================================================================

    /// Start a queue, building it first if it was never seeded
    pub async fn start_queue(&self, kind: QueueKind) -> Result<()> {
        let needs_build = match self.ctx.queues.get_state(kind).await? {
            Some(state) => state.total == 0,
            None => true,
        };
        if needs_build {
            self.builder.build(kind).await?;
        }
        self.manager.start(kind).await
    }

    /// Stop a queue; queued tags and cursors stay put for a later restart
    pub async fn stop_queue(&self, kind: QueueKind) -> Result<()> {
        self.manager.stop(kind).await
    }

    /// Whether the autosync category is enabled at all
    pub fn is_enabled(&self) -> bool {
        self.ctx.config.autosync_enabled
    }

    pub async fn is_running(&self, kind: QueueKind) -> Result<bool> {
        self.manager.is_running(kind).await
    }

    /// Point-in-time snapshot: threads, running flag, total, started-at
    pub async fn get_queue(&self, kind: QueueKind) -> Result<QueueSnapshot> {
        self.manager.snapshot(kind).await
    }

    /// Tag specific assets into a queue; returns per-thread counts
    pub async fn add_to_queue(
        &self,
        ids: &[AssetId],
        kind: QueueKind,
    ) -> Result<HashMap<String, u64>> {
        self.builder.add_to_queue(ids, kind).await
    }

    /// Run one bounded worker pass over a thread lane
    pub async fn run_thread(&self, kind: QueueKind, thread: &str) -> Result<RunSummary> {
        self.dispatcher.run_thread(kind, thread).await
    }

    /// Foreground processing of specific assets.
    ///
    /// Environment errors surface synchronously here; background dispatch
    /// only logs them.
    pub async fn process_assets(
        &self,
        ids: &[AssetId],
    ) -> Result<HashMap<AssetId, OutcomeMap>> {
        let mut results = HashMap::new();
        for id in ids {
            let outcomes = self.dispatcher.process_asset(*id).await?;
            results.insert(*id, outcomes);
        }
        Ok(results)
    }

    // ========================================================================
    // Per-asset actions
    // ========================================================================

    /// Explicit user action clearing a persisted error marker, re-enabling
    /// auto-dispatch for the asset
    pub async fn clear_error(&self, id: AssetId) -> Result<()> {
        if let Some(mut state) = self.ctx.states.get(id).await? {
            state.clear_error();
            state.updated_at = self.ctx.now();
            self.ctx.states.upsert(&state).await?;
            info!(asset_id = %id, "Cleared sync error");
        }
        Ok(())
    }

    /// Explicit bypass: force-stamp a sync type's signature without running
    /// it, so it is not reconsidered until its inputs change
    pub async fn bypass(&self, id: AssetId, slug: &str) -> Result<String> {
        let record = self
            .ctx
            .catalog
            .get(id.get())
            .await?
            .ok_or(SyncError::AssetNotFound(id))?;

        let mut state = self.ctx.states.get_or_default(id, self.ctx.now()).await?;
        let signature = self
            .engine
            .stamp_current(&self.ctx, &record, &mut state, slug)
            .await?;
        state.updated_at = self.ctx.now();
        self.ctx.states.upsert(&state).await?;

        info!(asset_id = %id, sync_type = slug, "Bypassed sync type");
        Ok(signature)
    }

    /// Request a storage mode change; the grace delay starts now
    pub async fn request_storage_mode(&self, id: AssetId, mode: StorageMode) -> Result<()> {
        let now = self.ctx.now();
        let mut state = self.ctx.states.get_or_default(id, now).await?;
        state.request_mode(mode, now);
        state.updated_at = now;
        self.ctx.states.upsert(&state).await?;

        info!(asset_id = %id, mode = %mode, "Storage mode requested");
        Ok(())
    }

    /// Mark an asset for download back to local storage
    pub async fn request_download(&self, id: AssetId) -> Result<()> {
        let now = self.ctx.now();
        let mut state = self.ctx.states.get_or_default(id, now).await?;
        state.downloading = true;
        state.updated_at = now;
        self.ctx.states.upsert(&state).await?;
        Ok(())
    }

    /// Mark an asset for full rollback
    pub async fn request_unsync(&self, id: AssetId) -> Result<()> {
        let now = self.ctx.now();
        let mut state = self.ctx.states.get_or_default(id, now).await?;
        state.unsync_requested = true;
        state.updated_at = now;
        self.ctx.states.upsert(&state).await?;
        Ok(())
    }

    /// Foreground deletion of an asset's remote counterpart.
    ///
    /// Blocked while a sync is in flight, unless an error marker is already
    /// recorded; a permanently errored asset must stay deletable.
    pub async fn delete_asset(&self, id: AssetId) -> Result<()> {
        let Some(mut state) = self.ctx.states.get(id).await? else {
            return Ok(());
        };

        if state.queued_thread.is_some() && !state.has_error() {
            return Err(SyncError::DeletePending { asset_id: id });
        }

        let Some(record) = self.ctx.catalog.get(id.get()).await? else {
            // The host already dropped the record; without a path there is
            // no managed-root check, so only local state is removed.
            warn!(asset_id = %id, "Deleting sync state for unknown asset");
            return self.ctx.states.delete(id).await;
        };

        let op = self.engine.registry().get("delete")?;
        match op.sync(&self.ctx, &record, &mut state).await? {
            crate::asset::SyncOutcome::Failed { error } => {
                state.updated_at = self.ctx.now();
                self.ctx.states.upsert(&state).await?;
                Err(SyncError::RemoteCleanup(error))
            }
            _ => self.ctx.states.delete(id).await,
        }
    }

    /// Library-wide local/remote byte totals from size sync bookkeeping
    pub async fn size_totals(&self) -> Result<SizeTotals> {
        let (local_bytes, remote_bytes) = self.ctx.states.size_totals().await?;
        Ok(SizeTotals {
            local_bytes,
            remote_bytes,
        })
    }
}

#[async_trait]
impl DispatchHandler for OffloadCoordinator {
    async fn handle(&self, request: DispatchRequest) {
        match request.operation.as_str() {
            "run_thread" => {
                let kind = request
                    .queue
                    .as_deref()
                    .and_then(|q| q.parse::<QueueKind>().ok());
                match (kind, request.thread.clone()) {
                    (Some(kind), Some(thread)) => {
                        if let Err(e) = self.dispatcher.run_thread(kind, &thread).await {
                            error!(thread = %thread, error = %e, "Background run failed");
                        }
                    }
                    _ => warn!(?request, "Malformed run_thread request"),
                }
            }
            "rebuild" => {
                let kind = request
                    .queue
                    .as_deref()
                    .and_then(|q| q.parse::<QueueKind>().ok());
                if let Some(kind) = kind {
                    if let Err(e) = self.builder.build(kind).await {
                        error!(queue = %kind, error = %e, "Background rebuild failed");
                    }
                } else {
                    warn!(?request, "Malformed rebuild request");
                }
            }
            other => warn!(operation = %other, "Unknown dispatch operation"),
        }
    }
}
