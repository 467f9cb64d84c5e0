//! # Resume/Health Monitor
//!
//! Periodic self-heal over the queues.
//!
//! ## Overview
//!
//! One scheduled check walks every queue kind that is enabled and marked
//! running. Threads whose heartbeat has gone stale get a background run
//! request; when a queue has zero live threads at all, the monitor stops
//! it, rebuilds it from the catalog, and restarts it.
//!
//! Both heal paths are idempotent against the persisted queue state, so a
//! duplicated firing is wasteful but safe. The check assumes a single host
//! runs the engine; multi-node deployments need their own coordination
//! (lock or leader election) in front of it.

use crate::builder::QueueBuilder;
use crate::context::SyncContext;
use crate::error::Result;
use crate::queue::{QueueKind, QueueManager, ThreadState};
use futures_util::FutureExt;
use offload_bridge::background::{BackgroundDispatcher, DispatchRequest, ScheduledTask, Scheduler};
use offload_bridge::remote::RemoteMediaStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Scheduler task id the monitor registers under
pub const HEALTH_CHECK_TASK: &str = "offload_health_check";

/// Restarts stalled threads and rebuilds dead queues on a fixed interval
pub struct HealthMonitor {
    ctx: Arc<SyncContext>,
    manager: Arc<QueueManager>,
    builder: Arc<QueueBuilder>,
}

impl HealthMonitor {
    pub fn new(
        ctx: Arc<SyncContext>,
        manager: Arc<QueueManager>,
        builder: Arc<QueueBuilder>,
    ) -> Self {
        Self {
            ctx,
            manager,
            builder,
        }
    }

    /// Register the periodic check with the host scheduler
    pub async fn install(self: Arc<Self>) -> Result<()> {
        let monitor = Arc::clone(&self);
        let task: ScheduledTask = Arc::new(move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.check().await;
            }
            .boxed()
        });

        self.ctx
            .scheduler
            .schedule_repeating(
                HEALTH_CHECK_TASK,
                Duration::from_secs(self.ctx.config.monitor_interval_secs),
                task,
            )
            .await?;

        info!(
            interval_secs = self.ctx.config.monitor_interval_secs,
            "Health monitor installed"
        );
        Ok(())
    }

    /// One full health pass over all queue kinds
    pub async fn check(&self) {
        for kind in QueueKind::ALL {
            if let Err(e) = self.check_queue(kind).await {
                error!(queue = %kind, error = %e, "Health check failed");
            }
        }
    }

    async fn check_queue(&self, kind: QueueKind) -> Result<()> {
        if !self.manager.kind_enabled(kind) || !self.manager.is_running(kind).await? {
            return Ok(());
        }

        // Unreachable remote: leave everything queued and try again on the
        // next interval rather than burning claims into errors.
        if !self.ctx.remote.probe().await {
            warn!(queue = %kind, "Remote store unreachable, deferring heal");
            return Ok(());
        }

        let states = self.manager.thread_states(kind).await?;
        let any_active = states
            .iter()
            .any(|(_, state)| *state == ThreadState::Active);
        let stalled: Vec<_> = states
            .iter()
            .filter(|(_, state)| *state == ThreadState::Stalled)
            .collect();

        if stalled.is_empty() {
            debug!(queue = %kind, "No stalled threads");
            return Ok(());
        }

        if !any_active {
            // Zero live threads: the queue itself is dead. Stop, rebuild
            // from the catalog, restart.
            info!(queue = %kind, "All threads stalled; rebuilding queue");
            self.manager.stop(kind).await?;
            self.builder.build(kind).await?;
            self.manager.start(kind).await?;
            return Ok(());
        }

        for (cursor, _) in stalled {
            info!(queue = %kind, thread = %cursor.thread, "Poking stalled thread");
            self.ctx
                .dispatcher
                .dispatch(DispatchRequest::run_thread(kind.as_str(), &cursor.thread))
                .await?;
        }

        Ok(())
    }
}
