//! # Harbor Core
//!
//! Core types and error handling shared by every Harbor crate:
//! - Error taxonomy (startup-fatal, per-request, supervisory)
//! - Server mode and transport enums
//! - Response payloads built by the application and flushed by the worker
//! - The PID record shared by the worker and its supervisor

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod pidfile;
pub mod response;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use pidfile::PidFile;
pub use response::{Body, ResponsePayload, ResponseSink};
pub use types::{ServerMode, SocketType};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::pidfile::PidFile;
    pub use crate::response::{Body, ResponsePayload, ResponseSink};
    pub use crate::types::{ServerMode, SocketType};
}
