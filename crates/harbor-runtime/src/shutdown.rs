//! Graceful shutdown and OS signal handling

use crate::tasks::ReloadHandle;
use harbor_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shutdown signal broadcaster
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.sender.send(());
            tracing::info!("Shutdown signal triggered");
        }
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown is triggered, including before the call
    pub async fn triggered(&self) {
        let mut receiver = self.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal handler for OS signals
///
/// SIGTERM and SIGINT trigger shutdown. SIGUSR2 reloads task workers.
#[derive(Debug)]
pub struct SignalHandler {
    signal: ShutdownSignal,
    reload: Option<ReloadHandle>,
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new(signal: ShutdownSignal) -> Self {
        Self {
            signal,
            reload: None,
        }
    }

    /// Reload task workers on SIGUSR2
    pub fn with_reload(mut self, reload: ReloadHandle) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Register the OS signal handlers now
    ///
    /// Once this returns, SIGTERM/SIGINT/SIGUSR2 are queued for the listener
    /// instead of taking their default action. Must be called inside a tokio
    /// runtime, before the worker's PID becomes visible.
    pub fn install(self) -> Result<SignalListener> {
        Ok(SignalListener {
            #[cfg(unix)]
            streams: UnixSignals::install()?,
            signal: self.signal,
            reload: self.reload,
        })
    }

    /// Install the handlers and listen until shutdown
    pub async fn run(self) -> Result<()> {
        self.install()?.run().await
    }
}

#[cfg(unix)]
#[derive(Debug)]
struct UnixSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
    sigusr2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl UnixSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                Error::Runtime(format!("Failed to setup {} handler: {}", name, e))
            })
        };

        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sigusr2: install(SignalKind::user_defined2(), "SIGUSR2")?,
        })
    }
}

/// Signal handler with its OS handlers already registered
#[derive(Debug)]
pub struct SignalListener {
    signal: ShutdownSignal,
    reload: Option<ReloadHandle>,
    #[cfg(unix)]
    streams: UnixSignals,
}

impl SignalListener {
    /// Listen for OS signals until shutdown
    pub async fn run(self) -> Result<()> {
        #[cfg(unix)]
        {
            let Self {
                signal,
                reload,
                mut streams,
            } = self;

            loop {
                tokio::select! {
                    _ = streams.sigterm.recv() => {
                        tracing::info!("Received SIGTERM");
                        signal.trigger();
                        break;
                    }
                    _ = streams.sigint.recv() => {
                        tracing::info!("Received SIGINT");
                        signal.trigger();
                        break;
                    }
                    _ = streams.sigusr2.recv() => {
                        tracing::info!("Received SIGUSR2");
                        match &reload {
                            Some(reload) => reload.reload(),
                            None => tracing::warn!("No task workers to reload"),
                        }
                    }
                    _ = signal.triggered() => break,
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map_err(|e| {
                        Error::Runtime(format!("Failed to listen for Ctrl+C: {}", e))
                    })?;
                    tracing::info!("Received Ctrl+C");
                    self.signal.trigger();
                }
                _ = self.signal.triggered() => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Task, TaskHandler, TaskHandlerFactory, TaskPool};
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct IdleFactory;

    struct IdleHandler;

    #[async_trait]
    impl TaskHandler for IdleHandler {
        async fn handle(&mut self, _task: Task) -> Result<()> {
            Ok(())
        }
    }

    impl TaskHandlerFactory for IdleFactory {
        fn create(&self, _worker_id: usize) -> Box<dyn TaskHandler> {
            Box::new(IdleHandler)
        }
    }

    #[tokio::test]
    async fn test_shutdown_signal_new() {
        let signal = ShutdownSignal::new();
        let _rx = signal.subscribe();
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_signal_multiple_subscribers() {
        let signal = ShutdownSignal::new();
        let mut rx1 = signal.subscribe();
        let mut rx2 = signal.subscribe();

        signal.trigger();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_after_the_fact() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handler_stops_when_triggered_elsewhere() {
        let signal = ShutdownSignal::new();
        let handler = tokio::spawn(SignalHandler::new(signal.clone()).run());

        signal.trigger();
        let result = tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_installed_listener_queues_sigusr2() {
        let pool = TaskPool::start(Arc::new(IdleFactory), 1, 4);
        let reload = pool.reload_handle();
        let signal = ShutdownSignal::new();
        let listener = SignalHandler::new(signal.clone())
            .with_reload(reload.clone())
            .install()
            .unwrap();

        // delivered before the listener task is polled; default action would kill us
        let status = std::process::Command::new("kill")
            .args(["-USR2", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let task = tokio::spawn(listener.run());
        for _ in 0..100 {
            if reload.generation() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reload.generation(), 1);
        assert!(!task.is_finished());

        signal.trigger();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        pool.shutdown().await;
    }
}
