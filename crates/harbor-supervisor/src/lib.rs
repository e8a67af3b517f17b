//! # Harbor Supervisor
//!
//! Manages a running worker from a separate invocation through its PID file
//! and POSIX signals:
//! - start (refuses when a live worker is recorded)
//! - stop (SIGTERM)
//! - restart/reload (SIGTERM, bounded wait, start again)
//! - reload-task (SIGUSR2)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod process;
pub mod signal;
pub mod supervisor;

pub use process::{ProcessControl, SystemProcess};
pub use signal::SupervisorSignal;
pub use supervisor::{RestartPolicy, Supervisor};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::process::{ProcessControl, SystemProcess};
    pub use crate::signal::SupervisorSignal;
    pub use crate::supervisor::{RestartPolicy, Supervisor};
}
