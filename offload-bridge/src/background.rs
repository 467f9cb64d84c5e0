//! Background Execution Primitives
//!
//! The engine never spawns its own long-lived workers. It asks the host for
//! two things: fire a named operation soon, out of band
//! ([`BackgroundDispatcher`]), and run a callback again every N seconds
//! ([`Scheduler`]). Everything else is persisted state.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// A request for out-of-band execution.
///
/// Requests are intentionally coarse: a named operation plus the queue kind
/// and thread it applies to. Delivery is at-least-once and unordered; the
/// engine's handlers are idempotent, so a duplicated or replayed request is
/// harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Operation name, e.g. `run_thread`
    pub operation: String,
    /// Queue kind the operation applies to, e.g. `bulk` or `auto`
    pub queue: Option<String>,
    /// Thread name the operation applies to
    pub thread: Option<String>,
}

impl DispatchRequest {
    /// Request a worker pass over one thread's queue
    pub fn run_thread(queue: impl Into<String>, thread: impl Into<String>) -> Self {
        Self {
            operation: "run_thread".to_string(),
            queue: Some(queue.into()),
            thread: Some(thread.into()),
        }
    }

    /// Request a full rebuild of one queue
    pub fn rebuild(queue: impl Into<String>) -> Self {
        Self {
            operation: "rebuild".to_string(),
            queue: Some(queue.into()),
            thread: None,
        }
    }
}

/// Receiver side of dispatched requests.
///
/// The engine implements this; the host's dispatcher implementation routes
/// every accepted [`DispatchRequest`] into it, typically on a fresh task.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    async fn handle(&self, request: DispatchRequest);
}

/// Fire-and-forget background dispatch.
///
/// `dispatch` must return without waiting for the operation to run. Hosts
/// back this with whatever they have: a task spawn, a work queue, a
/// loopback HTTP request.
///
/// # Example
///
/// ```ignore
/// use offload_bridge::background::{BackgroundDispatcher, DispatchRequest};
///
/// async fn poke(dispatcher: &dyn BackgroundDispatcher) -> offload_bridge::error::Result<()> {
///     dispatcher
///         .dispatch(DispatchRequest::run_thread("bulk", "queue_bulk_thread_0"))
///         .await
/// }
/// ```
#[async_trait]
pub trait BackgroundDispatcher: Send + Sync {
    /// Enqueue a request for out-of-band execution and return immediately
    async fn dispatch(&self, request: DispatchRequest) -> Result<()>;
}

/// Boxed async callback run by a [`Scheduler`].
pub type ScheduledTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Periodic callback scheduling.
///
/// The engine registers exactly one repeating task (the health monitor).
/// Timing does not need to be precise; a drifting interval is fine because
/// every heal action is idempotent against persisted state.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval`, starting one interval from now.
    ///
    /// Re-registering the same `task_id` replaces the previous schedule.
    async fn schedule_repeating(
        &self,
        task_id: &str,
        interval: Duration,
        task: ScheduledTask,
    ) -> Result<()>;

    /// Cancel a scheduled task. Unknown ids are a no-op.
    async fn cancel(&self, task_id: &str) -> Result<()>;
}
