//! Worker runtime construction

use harbor_core::{Error, Result, ServerMode};

/// Thread name used for multi-worker runtimes
pub const WORKER_THREAD_NAME: &str = "harbor-worker";

/// Worker pool manager
///
/// Builds the tokio runtime every request pipeline runs on. Multi-process
/// mode gets one worker thread per configured worker, event-loop mode runs
/// everything on the calling thread.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    mode: ServerMode,
    threads: usize,
}

impl WorkerPool {
    /// Create a new worker pool (`worker_num == 0` means one per CPU)
    pub fn new(mode: ServerMode, worker_num: usize) -> Self {
        let threads = match mode {
            ServerMode::EventLoop => 1,
            ServerMode::MultiProcess if worker_num == 0 => num_cpus::get(),
            ServerMode::MultiProcess => worker_num,
        };

        tracing::debug!(mode = %mode, threads, "Worker pool configured");

        Self { mode, threads }
    }

    /// Server mode
    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    /// Get worker count
    pub fn worker_count(&self) -> usize {
        self.threads
    }

    /// Build the runtime for this pool
    pub fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        let mut builder = match self.mode {
            ServerMode::EventLoop => tokio::runtime::Builder::new_current_thread(),
            ServerMode::MultiProcess => {
                let mut builder = tokio::runtime::Builder::new_multi_thread();
                builder
                    .worker_threads(self.threads)
                    .thread_name(WORKER_THREAD_NAME);
                builder
            }
        };

        builder
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(format!("Failed to build worker runtime: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_auto_threads() {
        let pool = WorkerPool::new(ServerMode::MultiProcess, 0);
        assert_eq!(pool.worker_count(), num_cpus::get());
    }

    #[test]
    fn test_worker_pool_custom_threads() {
        let pool = WorkerPool::new(ServerMode::MultiProcess, 4);
        assert_eq!(pool.worker_count(), 4);
    }

    #[test]
    fn test_event_loop_is_single_threaded() {
        let pool = WorkerPool::new(ServerMode::EventLoop, 8);
        assert_eq!(pool.worker_count(), 1);

        let runtime = pool.runtime().unwrap();
        let answer = runtime.block_on(async { 42 });
        assert_eq!(answer, 42);
    }

    #[test]
    fn test_multi_thread_runtime() {
        let runtime = WorkerPool::new(ServerMode::MultiProcess, 2).runtime().unwrap();
        let name = runtime.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        });
        assert_eq!(name.as_deref(), Some(WORKER_THREAD_NAME));
    }
}
