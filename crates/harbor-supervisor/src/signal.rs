//! Supervisory signal table

use nix::sys::signal::Signal;
use std::fmt;

/// Control signal sent to the running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// Graceful shutdown
    Stop,
    /// Rebuild task worker handlers
    ReloadTasks,
}

impl SupervisorSignal {
    /// POSIX signal delivered for this action
    pub fn as_signal(self) -> Signal {
        match self {
            Self::Stop => Signal::SIGTERM,
            Self::ReloadTasks => Signal::SIGUSR2,
        }
    }
}

impl fmt::Display for SupervisorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_signal().as_str())
    }
}
