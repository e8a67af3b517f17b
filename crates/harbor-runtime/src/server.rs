//! HTTP server implementation

use crate::connection::ConnectionProvider;
use crate::error_handler::ErrorHandler;
use crate::handler::RequestHandler;
use crate::lifecycle::{Application, LifecycleEngine, LifecycleHook, DEFAULT_LOG_FLUSH_INTERVAL};
use crate::shutdown::ShutdownSignal;
use crate::static_files::StaticFiles;
use crate::tasks::{ReloadHandle, TaskHandlerFactory, TaskPool};
use crate::RuntimeState;
use bytes::Bytes;
use harbor_config::Bootstrap;
use harbor_core::{Error, PidFile, Result, SocketType};
use http::Response;
use http_body_util::Full;
use hyper::rt::{Read, Write};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Capacity of the task queue shared by all task workers
pub const TASK_QUEUE_CAPACITY: usize = 1024;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A bound listener
#[derive(Debug)]
pub enum Listener {
    /// TCP listener
    Tcp(TcpListener),
    /// Unix domain socket listener and its path
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, PathBuf),
}

impl Listener {
    /// Bound TCP address, if any
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Listener::Unix(..) => None,
        }
    }

    /// Human-readable listen address
    pub fn label(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp".to_string()),
            #[cfg(unix)]
            Listener::Unix(_, path) => format!("unix:{}", path.display()),
        }
    }
}

/// HTTP server
pub struct Server {
    bootstrap: Arc<Bootstrap>,
    handler: RequestHandler,
    state: Arc<RwLock<RuntimeState>>,
    shutdown: ShutdownSignal,
    request_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    tasks: parking_lot::Mutex<Option<TaskPool>>,
    reload: Option<ReloadHandle>,
    pid_file: PidFile,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen", &self.bootstrap.server.listen_label())
            .field("request_count", &self.request_count)
            .field("task_workers", &self.reload.is_some())
            .finish()
    }
}

impl Server {
    /// Create a new server builder
    pub fn builder(bootstrap: Arc<Bootstrap>) -> ServerBuilder {
        ServerBuilder::new(bootstrap)
    }

    /// Get the current state
    pub async fn state(&self) -> RuntimeState {
        *self.state.read().await
    }

    /// Get request count
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Task worker reload handle, when task workers run
    pub fn reload_handle(&self) -> Option<ReloadHandle> {
        self.reload.clone()
    }

    /// Bind the configured listener
    pub async fn bind(&self) -> Result<Listener> {
        let config = &self.bootstrap.server;
        match config.socket_type {
            SocketType::Tcp => {
                let listener = TcpListener::bind((config.host.as_str(), config.port))
                    .await
                    .map_err(|e| {
                        Error::Runtime(format!(
                            "Failed to bind to {}: {}",
                            config.listen_label(),
                            e
                        ))
                    })?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            SocketType::Unix => {
                let path = PathBuf::from(&config.host);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = tokio::net::UnixListener::bind(&path).map_err(|e| {
                    Error::Runtime(format!("Failed to bind to {}: {}", path.display(), e))
                })?;
                Ok(Listener::Unix(listener, path))
            }
            #[cfg(not(unix))]
            SocketType::Unix => Err(Error::Config(
                "unix sockets are not supported on this platform".to_string(),
            )),
            SocketType::Udp => Err(Error::Config(
                "udp sockets cannot serve HTTP".to_string(),
            )),
        }
    }

    /// Bind and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown
    pub async fn serve(&self, listener: Listener) -> Result<()> {
        self.pid_file.write_current()?;

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::Running;
        }

        tracing::info!(
            listen = %listener.label(),
            pid = std::process::id(),
            "Server started"
        );

        loop {
            tokio::select! {
                accepted = accept(&listener) => {
                    match accepted {
                        Ok(Accepted::Tcp(stream, addr)) => {
                            tracing::trace!("Accepted connection from {}", addr);
                            spawn_connection(
                                hyper_util::rt::TokioIo::new(stream),
                                self.handler.clone(),
                                Some(addr),
                            );
                        }
                        #[cfg(unix)]
                        Ok(Accepted::Unix(stream)) => {
                            tracing::trace!("Accepted unix socket connection");
                            spawn_connection(
                                hyper_util::rt::TokioIo::new(stream),
                                self.handler.clone(),
                                None,
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = self.shutdown.triggered() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        let socket_path = match &listener {
            #[cfg(unix)]
            Listener::Unix(_, path) => Some(path.clone()),
            _ => None,
        };
        drop(listener);

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::ShuttingDown;
        }

        self.drain().await;

        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }

        if let Err(e) = self.pid_file.remove() {
            tracing::warn!(error = %e, "Failed to remove pid file");
        }
        if let Some(path) = socket_path {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Socket file not removed");
            }
        }

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::Stopped;
        }

        tracing::info!(requests = self.request_count(), "Server stopped");
        Ok(())
    }

    /// Wait for in-flight requests up to the shutdown timeout
    async fn drain(&self) {
        let timeout = self.bootstrap.server.shutdown_timeout;
        let start = std::time::Instant::now();

        loop {
            let active = self.in_flight.load(Ordering::SeqCst);
            if active == 0 {
                tracing::info!("All requests completed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= timeout {
                tracing::warn!(
                    active_requests = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tracing::debug!(
                active_requests = active,
                elapsed_ms = start.elapsed().as_millis(),
                "Waiting for active requests to complete"
            );
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

enum Accepted {
    Tcp(tokio::net::TcpStream, SocketAddr),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

async fn accept(listener: &Listener) -> std::io::Result<Accepted> {
    match listener {
        Listener::Tcp(listener) => {
            let (stream, addr) = listener.accept().await?;
            Ok(Accepted::Tcp(stream, addr))
        }
        #[cfg(unix)]
        Listener::Unix(listener, _) => {
            let (stream, _) = listener.accept().await?;
            Ok(Accepted::Unix(stream))
        }
    }
}

fn spawn_connection<I>(io: I, handler: RequestHandler, remote_addr: Option<SocketAddr>)
where
    I: Read + Write + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let service = hyper::service::service_fn(move |req| {
            let handler = handler.clone();
            async move {
                let response = match handler.handle(req, remote_addr).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!("Request handler error: {}", e);
                        let mut response = Response::new(Full::new(Bytes::from(e.to_string())));
                        *response.status_mut() = e.to_status_code();
                        response
                    }
                };
                Ok::<_, Infallible>(response)
            }
        });

        if let Err(e) = hyper::server::conn::http1::Builder::new()
            .serve_connection(io, service)
            .await
        {
            tracing::debug!("HTTP connection error: {}", e);
        }
    });
}

/// Server builder
pub struct ServerBuilder {
    bootstrap: Arc<Bootstrap>,
    application: Option<Arc<dyn Application>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    connections: Option<Arc<dyn ConnectionProvider>>,
    task_factory: Option<Arc<dyn TaskHandlerFactory>>,
    log_flush_interval: usize,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("listen", &self.bootstrap.server.listen_label())
            .field("hooks", &self.hooks.len())
            .field("task_factory", &self.task_factory)
            .finish()
    }
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new(bootstrap: Arc<Bootstrap>) -> Self {
        Self {
            bootstrap,
            application: None,
            hooks: Vec::new(),
            error_handler: None,
            connections: None,
            task_factory: None,
            log_flush_interval: DEFAULT_LOG_FLUSH_INTERVAL,
        }
    }

    /// Set the application run for every request
    pub fn application(mut self, application: Arc<dyn Application>) -> Self {
        self.application = Some(application);
        self
    }

    /// Add a lifecycle hook
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the error handler
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Set the database connection provider
    pub fn connections(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.connections = Some(provider);
        self
    }

    /// Set the task handler factory used by task workers
    pub fn task_factory(mut self, factory: Arc<dyn TaskHandlerFactory>) -> Self {
        self.task_factory = Some(factory);
        self
    }

    /// Set the per-request log flush interval
    pub fn log_flush_interval(mut self, interval: usize) -> Self {
        self.log_flush_interval = interval;
        self
    }

    /// Build the server; task workers start here, so call inside a runtime
    pub fn build(self) -> Result<Server> {
        let config = &self.bootstrap.server;
        if config.socket_type == SocketType::Udp {
            return Err(Error::Config("udp sockets cannot serve HTTP".to_string()));
        }

        let tasks = match (&self.task_factory, config.task_worker_num) {
            (Some(factory), workers) if workers > 0 => Some(TaskPool::start(
                Arc::clone(factory),
                workers,
                TASK_QUEUE_CAPACITY,
            )),
            (None, workers) if workers > 0 => {
                tracing::warn!(workers, "Task workers configured without a task handler");
                None
            }
            _ => None,
        };

        let mut engine = LifecycleEngine::builder(Arc::clone(&self.bootstrap))
            .log_flush_interval(self.log_flush_interval);
        if let Some(application) = self.application {
            engine = engine.application(application);
        }
        for hook in self.hooks {
            engine = engine.hook(hook);
        }
        if let Some(handler) = self.error_handler {
            engine = engine.error_handler(handler);
        }
        if let Some(provider) = self.connections {
            engine = engine.connections(provider);
        }
        if let Some(tasks) = &tasks {
            engine = engine.tasks(tasks.dispatcher());
        }

        let static_files = if config.static_handler_enabled() {
            self.bootstrap.document_root().map(StaticFiles::new)
        } else {
            None
        };

        let request_count = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let handler = RequestHandler::new(
            engine.build(),
            static_files,
            Arc::clone(&request_count),
            Arc::clone(&in_flight),
        );

        tracing::info!(
            listen = %config.listen_label(),
            mode = %config.mode,
            static_handler = config.static_handler_enabled(),
            task_workers = tasks.as_ref().map(TaskPool::worker_count).unwrap_or(0),
            "Server components initialized"
        );

        Ok(Server {
            pid_file: PidFile::new(&config.pid_file),
            reload: tasks.as_ref().map(TaskPool::reload_handle),
            tasks: parking_lot::Mutex::new(tasks),
            bootstrap: self.bootstrap,
            handler,
            state: Arc::new(RwLock::new(RuntimeState::Initializing)),
            shutdown: ShutdownSignal::new(),
            request_count,
            in_flight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_config::{AppConfig, RuntimeEnv, ServerConfig};
    use tempfile::TempDir;

    fn bootstrap(dir: &TempDir, socket_type: SocketType) -> Arc<Bootstrap> {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            socket_type,
            pid_file: dir.path().join("harbor.pid"),
            document_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        Arc::new(Bootstrap {
            server,
            app: AppConfig::default(),
            env: RuntimeEnv::default(),
        })
    }

    #[tokio::test]
    async fn test_server_builder() {
        let dir = TempDir::new().unwrap();
        let server = Server::builder(bootstrap(&dir, SocketType::Tcp)).build().unwrap();

        assert_eq!(server.state().await, RuntimeState::Initializing);
        assert_eq!(server.request_count(), 0);
        assert!(server.reload_handle().is_none());
    }

    #[tokio::test]
    async fn test_udp_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Server::builder(bootstrap(&dir, SocketType::Udp)).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_writes_and_removes_pid_file() {
        let dir = TempDir::new().unwrap();
        let server = Arc::new(Server::builder(bootstrap(&dir, SocketType::Tcp)).build().unwrap());
        let listener = server.bind().await.unwrap();
        assert!(listener.local_addr().is_some());

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.serve(listener).await });

        let pid_path = dir.path().join("harbor.pid");
        for _ in 0..100 {
            if pid_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recorded = std::fs::read_to_string(&pid_path).unwrap();
        assert_eq!(recorded, std::process::id().to_string());

        server.shutdown_signal().trigger();
        handle.await.unwrap().unwrap();

        assert!(!pid_path.exists());
        assert_eq!(server.state().await, RuntimeState::Stopped);
    }
}
