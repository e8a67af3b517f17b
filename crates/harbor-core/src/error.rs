//! Error types for the Harbor worker and supervisor

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for Harbor
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP-related errors
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Invalid HTTP request
    #[error("Invalid HTTP request: {0}")]
    InvalidRequest(String),

    /// Configuration error (missing file, malformed merge target)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lifecycle state change that the state machine forbids
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// State the instance was in
        from: String,
        /// State that was requested
        to: String,
    },

    /// The native response was already written for this request
    #[error("Response already sent")]
    ResponseAlreadySent,

    /// A request-scoped resource failed to release
    #[error("Failed to release {resource}: {message}")]
    Resource {
        /// Resource description
        resource: String,
        /// Error message
        message: String,
    },

    /// Database connection error raised by a connection collaborator
    #[error("Connection error on '{name}': {message}")]
    Connection {
        /// Connection name
        name: String,
        /// Error message
        message: String,
    },

    /// Task worker queue error
    #[error("Task queue error: {0}")]
    TaskQueue(String),

    /// A live worker already owns the PID file
    #[error("server already started (pid {0})")]
    AlreadyRunning(i32),

    /// No live worker is recorded in the PID file
    #[error("server is not running!")]
    NotRunning,

    /// The worker did not exit within the restart polling bound
    #[error("Server stopped timeout (pid {pid} still alive after {waited_ms}ms)")]
    StopTimeout {
        /// Worker PID
        pid: i32,
        /// Time spent polling
        waited_ms: u64,
    },

    /// Failed to deliver a signal to the worker
    #[error("Failed to send {signal} to pid {pid}: {message}")]
    Signal {
        /// Signal name
        signal: String,
        /// Target PID
        pid: i32,
        /// Error message
        message: String,
    },

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How far an error is allowed to propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Aborts process start; no listener is bound
    StartupFatal,
    /// Contained to a single request; the worker keeps serving
    Request,
    /// Reported to the invoking supervisor command
    Supervisory,
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Http(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::TaskQueue(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify the error by how far it may propagate
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Io(_) | Error::Runtime(_) => ErrorCategory::StartupFatal,
            Error::AlreadyRunning(_)
            | Error::NotRunning
            | Error::StopTimeout { .. }
            | Error::Signal { .. } => ErrorCategory::Supervisory,
            _ => ErrorCategory::Request,
        }
    }

    /// Create a resource release error
    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resource {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connection {
            name: name.into(),
            message: message.into(),
        }
    }
}
