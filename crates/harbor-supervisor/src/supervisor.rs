//! Start/stop/restart/reload/reload-task against the PID record

use crate::process::{ProcessControl, SystemProcess};
use crate::signal::SupervisorSignal;
use harbor_config::ServerConfig;
use harbor_core::{Error, PidFile, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounded wait for the old worker to exit during a restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Time between liveness polls
    pub poll_interval: Duration,
    /// Polls before giving up
    pub max_attempts: u32,
}

impl RestartPolicy {
    /// Longest time a restart waits
    pub fn total_wait(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 10,
        }
    }
}

/// Supervises a worker through its PID file
#[derive(Debug)]
pub struct Supervisor<P = SystemProcess> {
    pid_file: PidFile,
    log_file: PathBuf,
    process: P,
    policy: RestartPolicy,
}

impl Supervisor<SystemProcess> {
    /// Supervisor for the worker described by `config`
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_process(&config.pid_file, &config.log_file, SystemProcess)
    }
}

impl<P: ProcessControl> Supervisor<P> {
    /// Supervisor with a custom process seam
    pub fn with_process(pid_file: impl Into<PathBuf>, log_file: impl Into<PathBuf>, process: P) -> Self {
        Self {
            pid_file: PidFile::new(pid_file),
            log_file: log_file.into(),
            process,
            policy: RestartPolicy::default(),
        }
    }

    /// Override the restart wait
    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The PID record
    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// PID of the live worker, purging a stale record
    pub fn running_pid(&self) -> Result<Option<i32>> {
        match self.pid_file.read()? {
            Some(pid) if self.process.is_alive(pid) => Ok(Some(pid)),
            stale => {
                if self.pid_file.exists() {
                    tracing::info!(
                        pid = ?stale,
                        path = %self.pid_file.path().display(),
                        "Removing stale pid file"
                    );
                    self.pid_file.remove()?;
                }
                Ok(None)
            }
        }
    }

    /// Fail with `AlreadyRunning` when a live worker is recorded
    pub fn ensure_not_running(&self) -> Result<()> {
        match self.running_pid()? {
            Some(pid) => Err(Error::AlreadyRunning(pid)),
            None => Ok(()),
        }
    }

    /// Create the PID file and log file directories
    pub fn prepare_directories(&self) -> Result<()> {
        for path in [self.pid_file.path(), self.log_file.as_path()] {
            if let Some(parent) = parent_dir(path) {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Start the worker; `launch` runs bootstrap and serves until shutdown
    pub fn start<T>(&self, launch: impl FnOnce() -> Result<T>) -> Result<T> {
        self.ensure_not_running()?;
        self.prepare_directories()?;
        launch()
    }

    /// Ask the worker to shut down and return its PID without waiting
    pub fn stop(&self) -> Result<i32> {
        self.signal(SupervisorSignal::Stop)
    }

    /// Ask the worker to rebuild its task workers
    pub fn reload_tasks(&self) -> Result<i32> {
        self.signal(SupervisorSignal::ReloadTasks)
    }

    /// Stop the worker and wait for it to exit within the restart policy
    pub fn stop_and_wait(&self) -> Result<i32> {
        let pid = self.stop()?;

        let mut attempts = 0;
        while self.process.is_alive(pid) {
            if attempts >= self.policy.max_attempts {
                let waited_ms = self.policy.total_wait().as_millis() as u64;
                tracing::warn!(pid, waited_ms, "Worker did not stop in time");
                return Err(Error::StopTimeout { pid, waited_ms });
            }
            std::thread::sleep(self.policy.poll_interval);
            attempts += 1;
        }

        // the worker removes its own record; this only clears a crash leftover
        self.running_pid()?;
        tracing::info!(pid, attempts, "Worker stopped");
        Ok(pid)
    }

    /// Stop the worker, wait, then start again
    ///
    /// Nothing is started when the old worker outlives the wait.
    pub fn restart<T>(&self, launch: impl FnOnce() -> Result<T>) -> Result<T> {
        self.stop_and_wait()?;
        self.start(launch)
    }

    /// Full reload; same as [`Supervisor::restart`]
    pub fn reload<T>(&self, launch: impl FnOnce() -> Result<T>) -> Result<T> {
        self.restart(launch)
    }

    fn signal(&self, signal: SupervisorSignal) -> Result<i32> {
        let pid = self.running_pid()?.ok_or(Error::NotRunning)?;
        self.process.send_signal(pid, signal)?;
        tracing::info!(pid, signal = %signal, "Signal delivered to worker");
        Ok(pid)
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessControl;
    use mockall::predicate::eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn fast() -> RestartPolicy {
        RestartPolicy {
            poll_interval: Duration::from_millis(1),
            max_attempts: 10,
        }
    }

    fn supervisor(dir: &TempDir, process: MockProcessControl) -> Supervisor<MockProcessControl> {
        Supervisor::with_process(
            dir.path().join("run/harbor.pid"),
            dir.path().join("logs/harbor.log"),
            process,
        )
        .with_policy(fast())
    }

    fn record(dir: &TempDir, pid: i32) {
        fs::create_dir_all(dir.path().join("run")).unwrap();
        fs::write(dir.path().join("run/harbor.pid"), pid.to_string()).unwrap();
    }

    #[test]
    fn test_default_policy_bound() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_millis(100));
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.total_wait(), Duration::from_secs(1));
    }

    #[test]
    fn test_stale_record_is_purged() {
        let dir = TempDir::new().unwrap();
        record(&dir, 4242);

        let mut process = MockProcessControl::new();
        process.expect_is_alive().with(eq(4242)).return_const(false);
        let supervisor = supervisor(&dir, process);

        assert_eq!(supervisor.running_pid().unwrap(), None);
        assert!(!supervisor.pid_file().exists());

        let launched = Cell::new(false);
        let result = supervisor.start(|| {
            launched.set(true);
            Ok(())
        });
        assert!(result.is_ok());
        assert!(launched.get());
    }

    #[test]
    fn test_start_refuses_live_worker() {
        let dir = TempDir::new().unwrap();
        record(&dir, 77);

        let mut process = MockProcessControl::new();
        process.expect_is_alive().return_const(true);
        let supervisor = supervisor(&dir, process);

        let launched = Cell::new(false);
        let result = supervisor.start(|| {
            launched.set(true);
            Ok(())
        });
        assert!(matches!(result, Err(Error::AlreadyRunning(77))));
        assert!(!launched.get());
    }

    #[test]
    fn test_start_prepares_directories() {
        let dir = TempDir::new().unwrap();
        let process = MockProcessControl::new();
        let supervisor = supervisor(&dir, process);

        let value = supervisor.start(|| Ok(5)).unwrap();
        assert_eq!(value, 5);
        assert!(dir.path().join("run").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_stop_without_worker() {
        let dir = TempDir::new().unwrap();
        let mut process = MockProcessControl::new();
        process.expect_send_signal().never();
        let supervisor = supervisor(&dir, process);

        assert!(matches!(supervisor.stop(), Err(Error::NotRunning)));
        assert!(matches!(supervisor.reload_tasks(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_stop_sends_sigterm() {
        let dir = TempDir::new().unwrap();
        record(&dir, 99);

        let mut process = MockProcessControl::new();
        process.expect_is_alive().return_const(true);
        process
            .expect_send_signal()
            .with(eq(99), eq(SupervisorSignal::Stop))
            .times(1)
            .returning(|_, _| Ok(()));
        let supervisor = supervisor(&dir, process);

        assert_eq!(supervisor.stop().unwrap(), 99);
    }

    #[test]
    fn test_reload_tasks_sends_sigusr2() {
        let dir = TempDir::new().unwrap();
        record(&dir, 99);

        let mut process = MockProcessControl::new();
        process.expect_is_alive().return_const(true);
        process
            .expect_send_signal()
            .with(eq(99), eq(SupervisorSignal::ReloadTasks))
            .times(1)
            .returning(|_, _| Ok(()));
        let supervisor = supervisor(&dir, process);

        assert_eq!(supervisor.reload_tasks().unwrap(), 99);
    }

    #[test]
    fn test_restart_waits_then_starts() {
        let dir = TempDir::new().unwrap();
        record(&dir, 12);

        let mut process = MockProcessControl::new();
        // alive for the pre-signal check and three polls, then gone
        let mut calls = 0;
        process.expect_is_alive().with(eq(12)).returning(move |_| {
            calls += 1;
            calls <= 4
        });
        process
            .expect_send_signal()
            .with(eq(12), eq(SupervisorSignal::Stop))
            .times(1)
            .returning(|_, _| Ok(()));
        let supervisor = supervisor(&dir, process);

        let started = supervisor.restart(|| Ok("started")).unwrap();
        assert_eq!(started, "started");
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn test_restart_timeout_does_not_start() {
        let dir = TempDir::new().unwrap();
        record(&dir, 12);

        let mut process = MockProcessControl::new();
        process.expect_is_alive().return_const(true);
        process.expect_send_signal().returning(|_, _| Ok(()));
        let supervisor = supervisor(&dir, process);

        let launched = Cell::new(false);
        let result = supervisor.reload(|| {
            launched.set(true);
            Ok(())
        });
        match result {
            Err(Error::StopTimeout { pid, waited_ms }) => {
                assert_eq!(pid, 12);
                assert_eq!(waited_ms, 10);
            }
            other => panic!("expected StopTimeout, got {other:?}"),
        }
        assert!(!launched.get());
    }

    #[test]
    fn test_real_process_liveness() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::with_process(
            dir.path().join("harbor.pid"),
            dir.path().join("harbor.log"),
            SystemProcess,
        );

        supervisor.pid_file().write_current().unwrap();
        assert_eq!(
            supervisor.running_pid().unwrap(),
            Some(std::process::id() as i32)
        );

        fs::write(dir.path().join("harbor.pid"), i32::MAX.to_string()).unwrap();
        assert_eq!(supervisor.running_pid().unwrap(), None);
        assert!(!supervisor.pid_file().exists());
    }
}
