//! Liveness checks and signal delivery

use crate::signal::SupervisorSignal;
use harbor_core::{Error, Result};
use nix::sys::signal;
use nix::unistd::{getpgid, Pid};

/// Operating system seam used by the supervisor
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl {
    /// Whether `pid` names a live process group member
    fn is_alive(&self, pid: i32) -> bool;

    /// Deliver `signal` to `pid`
    fn send_signal(&self, pid: i32, signal: SupervisorSignal) -> Result<()>;
}

/// Real process control through `getpgid(2)` and `kill(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn is_alive(&self, pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        getpgid(Some(Pid::from_raw(pid))).is_ok()
    }

    fn send_signal(&self, pid: i32, sig: SupervisorSignal) -> Result<()> {
        match signal::kill(Pid::from_raw(pid), sig.as_signal()) {
            Ok(()) => {
                tracing::debug!(pid, signal = %sig, "Signal sent");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                tracing::debug!(pid, signal = %sig, "Process already gone (ESRCH)");
                Err(Error::NotRunning)
            }
            Err(e) => Err(Error::Signal {
                signal: sig.to_string(),
                pid,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        let pid = std::process::id() as i32;
        assert!(SystemProcess.is_alive(pid));
    }

    #[test]
    fn test_bogus_pids_are_dead() {
        assert!(!SystemProcess.is_alive(0));
        assert!(!SystemProcess.is_alive(-5));
        assert!(!SystemProcess.is_alive(i32::MAX));
    }

    #[test]
    fn test_signal_to_missing_process() {
        let result = SystemProcess.send_signal(i32::MAX, SupervisorSignal::ReloadTasks);
        assert!(matches!(result, Err(Error::NotRunning)));
    }
}
