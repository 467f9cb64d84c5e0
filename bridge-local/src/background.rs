//! Background Dispatch and Scheduling using Tokio

use async_trait::async_trait;
use offload_bridge::{
    background::{
        BackgroundDispatcher, DispatchHandler, DispatchRequest, ScheduledTask, Scheduler,
    },
    error::{BridgeError, Result},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Tokio task-spawn dispatcher.
///
/// Each dispatched request runs on its own task, which mirrors a host that
/// services "run this soon" requests on fresh invocations. The handler is
/// wired in after construction because the engine that handles requests also
/// needs the dispatcher to issue them.
pub struct TaskDispatcher {
    handler: RwLock<Option<Arc<dyn DispatchHandler>>>,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    /// Install the request handler. Replaces any previous handler.
    pub async fn set_handler(&self, handler: Arc<dyn DispatchHandler>) {
        let mut slot = self.handler.write().await;
        *slot = Some(handler);
    }
}

impl Default for TaskDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundDispatcher for TaskDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<()> {
        let handler = {
            let slot = self.handler.read().await;
            slot.clone()
        };

        let handler = handler.ok_or_else(|| {
            BridgeError::NotAvailable("TaskDispatcher has no handler installed".to_string())
        })?;

        debug!(operation = %request.operation, thread = ?request.thread, "Dispatching background request");
        tokio::spawn(async move {
            handler.handle(request).await;
        });

        Ok(())
    }
}

/// Tokio interval-loop scheduler.
///
/// Each registered task loops `sleep(interval); task().await` until
/// cancelled. Re-registering an id aborts the previous loop first.
pub struct IntervalScheduler {
    tasks: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.try_read() {
            for handle in tasks.values() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn schedule_repeating(
        &self,
        task_id: &str,
        interval: Duration,
        task: ScheduledTask,
    ) -> Result<()> {
        let mut tasks = self.tasks.write().await;

        if let Some(previous) = tasks.remove(task_id) {
            warn!(task_id = %task_id, "Replacing existing scheduled task");
            previous.abort();
        }

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                task().await;
            }
        });

        tasks.insert(task_id.to_string(), handle);
        Ok(())
    }

    async fn cancel(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if let Some(handle) = tasks.remove(task_id) {
            handle.abort();
            debug!(task_id = %task_id, "Cancelled scheduled task");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DispatchHandler for CountingHandler {
        async fn handle(&self, _request: DispatchRequest) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_fails() {
        let dispatcher = TaskDispatcher::new();
        let result = dispatcher
            .dispatch(DispatchRequest::run_thread("bulk", "queue_bulk_thread_0"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let dispatcher = TaskDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        dispatcher
            .set_handler(Arc::new(CountingHandler {
                count: count.clone(),
            }))
            .await;

        dispatcher
            .dispatch(DispatchRequest::run_thread("bulk", "queue_bulk_thread_0"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scheduler_fires_and_cancels() {
        let scheduler = IntervalScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let task_count = count.clone();
        let task: ScheduledTask = Arc::new(move || {
            let c = task_count.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        scheduler
            .schedule_repeating("health", Duration::from_millis(10), task)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.cancel("health").await.unwrap();
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least two firings, got {}", fired);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }
}
