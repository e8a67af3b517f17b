//! # Harbor Runtime
//!
//! Persistent worker runtime with fresh per-request application semantics:
//! - Request/response adapters over hyper
//! - Per-request application lifecycle with guaranteed teardown
//! - Resource registry for connections, uploads and log buffers
//! - Static file handler and background task workers
//! - Server loop, graceful shutdown and signal handling

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod adapter;
pub mod connection;
pub mod context;
pub mod error_handler;
pub mod handler;
pub mod instance;
pub mod lifecycle;
pub mod log;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod static_files;
pub mod tasks;
pub mod worker;

pub use adapter::{RequestAdapter, ResponseAdapter, ResponseReceiver};
pub use connection::{Connection, ConnectionProvider, NoDriver};
pub use context::RequestContext;
pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use handler::RequestHandler;
pub use instance::{ApplicationInstance, ExitRequest};
pub use lifecycle::{
    Application, DispatchResult, Interrupt, LifecycleEngine, LifecycleEngineBuilder,
    LifecycleHook, NotFound, RequestOutcome,
};
pub use log::{LogBuffer, LogLevel, LogRecord};
pub use registry::{
    ReleaseReport, ResourceHandle, ResourceId, ResourceKind, ResourceRegistry, UploadedFile,
};
pub use server::{Listener, Server, ServerBuilder};
pub use shutdown::{ShutdownSignal, SignalHandler, SignalListener};
pub use state::LifecycleState;
pub use static_files::StaticFiles;
pub use tasks::{ReloadHandle, Task, TaskDispatcher, TaskHandler, TaskHandlerFactory, TaskPool};
pub use worker::WorkerPool;

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Server is initializing
    Initializing,
    /// Server is running
    Running,
    /// Server is shutting down
    ShuttingDown,
    /// Server is stopped
    Stopped,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::instance::{ApplicationInstance, ExitRequest};
    pub use crate::lifecycle::{Application, DispatchResult, Interrupt, LifecycleHook};
    pub use crate::log::LogLevel;
    pub use crate::server::{Server, ServerBuilder};
    pub use crate::shutdown::{ShutdownSignal, SignalHandler, SignalListener};
    pub use crate::RuntimeState;
    pub use harbor_core::{ResponsePayload, StatusCode};
}
