//! Background task workers
//!
//! Requests hand work to a fixed pool of task workers through a bounded
//! queue. Reloading the pool makes each worker finish its current task and
//! rebuild its handler from the factory, so new task code is picked up
//! without restarting the server.

use async_trait::async_trait;
use harbor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task name, used by handlers to route work
    pub name: String,
    /// Task arguments
    pub payload: serde_json::Value,
}

impl Task {
    /// Create a task
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Executes tasks on one worker
#[async_trait]
pub trait TaskHandler: Send {
    /// Run one task
    async fn handle(&mut self, task: Task) -> Result<()>;
}

/// Builds task handlers; called at worker start and on every reload
pub trait TaskHandlerFactory: Send + Sync + fmt::Debug {
    /// Create a handler for worker `worker_id`
    fn create(&self, worker_id: usize) -> Box<dyn TaskHandler>;
}

/// Cloneable handle for queueing tasks
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    sender: mpsc::Sender<Task>,
}

impl TaskDispatcher {
    /// Queue a task without waiting
    pub fn dispatch(&self, task: Task) -> Result<()> {
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => {
                Error::TaskQueue(format!("queue full, dropped task '{}'", task.name))
            }
            mpsc::error::TrySendError::Closed(task) => {
                Error::TaskQueue(format!("task workers stopped, dropped task '{}'", task.name))
            }
        })
    }
}

/// Handle that triggers a task worker reload
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    generation: Arc<watch::Sender<u64>>,
}

impl ReloadHandle {
    /// Ask every worker to rebuild its handler
    pub fn reload(&self) {
        self.generation.send_modify(|generation| *generation += 1);
        tracing::info!(generation = *self.generation.borrow(), "Task worker reload requested");
    }

    /// Number of reloads requested so far
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }
}

/// Pool of task workers
pub struct TaskPool {
    dispatcher: TaskDispatcher,
    reload: ReloadHandle,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn `workers` task workers; must be called inside a tokio runtime
    pub fn start(factory: Arc<dyn TaskHandlerFactory>, workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (generation, _) = watch::channel(0u64);
        let generation = Arc::new(generation);
        let cancel = CancellationToken::new();

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&factory),
                    Arc::clone(&receiver),
                    generation.subscribe(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(workers, queue_capacity, "Task workers started");

        Self {
            dispatcher: TaskDispatcher { sender },
            reload: ReloadHandle { generation },
            cancel,
            workers: handles,
        }
    }

    /// Handle for queueing tasks
    pub fn dispatcher(&self) -> TaskDispatcher {
        self.dispatcher.clone()
    }

    /// Handle for reloading workers
    pub fn reload_handle(&self) -> ReloadHandle {
        self.reload.clone()
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers after their current task
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Task worker ended abnormally");
            }
        }
        tracing::info!("Task workers stopped");
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers.len())
            .field("generation", &self.reload.generation())
            .finish()
    }
}

async fn run_worker(
    worker_id: usize,
    factory: Arc<dyn TaskHandlerFactory>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    mut generation: watch::Receiver<u64>,
    cancel: CancellationToken,
) {
    let mut handler = factory.create(worker_id);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            changed = generation.changed() => {
                if changed.is_err() {
                    break;
                }
                handler = factory.create(worker_id);
                tracing::debug!(worker_id, generation = *generation.borrow(), "Task worker reloaded");
            }

            task = next_task(&receiver) => {
                let Some(task) = task else { break };
                let name = task.name.clone();
                if let Err(e) = handler.handle(task).await {
                    tracing::warn!(worker_id, task = %name, error = %e, "Task failed");
                }
            }
        }
    }
}

async fn next_task(receiver: &Mutex<mpsc::Receiver<Task>>) -> Option<Task> {
    receiver.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingFactory {
        created: AtomicUsize,
        seen: Arc<SyncMutex<Vec<String>>>,
    }

    struct RecordingHandler {
        build: usize,
        seen: Arc<SyncMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&mut self, task: Task) -> Result<()> {
            self.seen.lock().push(format!("{}@{}", task.name, self.build));
            Ok(())
        }
    }

    impl TaskHandlerFactory for RecordingFactory {
        fn create(&self, _worker_id: usize) -> Box<dyn TaskHandler> {
            let build = self.created.fetch_add(1, Ordering::SeqCst);
            Box::new(RecordingHandler {
                build,
                seen: Arc::clone(&self.seen),
            })
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_dispatch_runs_task() {
        let factory = Arc::new(RecordingFactory::default());
        let pool = TaskPool::start(factory.clone(), 2, 8);
        assert_eq!(pool.worker_count(), 2);

        pool.dispatcher()
            .dispatch(Task::new("send-mail", serde_json::json!({ "to": "a@b.c" })))
            .unwrap();

        let seen = Arc::clone(&factory.seen);
        wait_until(|| seen.lock().len() == 1).await;
        assert!(seen.lock()[0].starts_with("send-mail@"));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_rebuilds_handlers() {
        let factory = Arc::new(RecordingFactory::default());
        let pool = TaskPool::start(factory.clone(), 2, 8);
        wait_until(|| factory.created.load(Ordering::SeqCst) == 2).await;

        let reload = pool.reload_handle();
        reload.reload();
        assert_eq!(reload.generation(), 1);

        wait_until(|| factory.created.load(Ordering::SeqCst) == 4).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_fails() {
        let factory = Arc::new(RecordingFactory::default());
        let pool = TaskPool::start(factory, 1, 1);
        let dispatcher = pool.dispatcher();
        pool.shutdown().await;

        let err = dispatcher.dispatch(Task::new("late", serde_json::Value::Null)).unwrap_err();
        assert!(matches!(err, Error::TaskQueue(_)));
    }
}
