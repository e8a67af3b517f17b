//! PID record of the running worker

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File holding the decimal PID of the running worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// PID record at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded PID
    ///
    /// `Ok(None)` when no record exists. Unparseable contents are reported
    /// as `Ok(None)` too, the record is useless either way.
    pub fn read(&self) -> Result<Option<i32>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Ok(None),
        }
    }

    /// Whether a record exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `pid`, creating parent directories
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string()).map_err(|e| {
            Error::Runtime(format!(
                "Failed to write pid file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Write the current process ID
    pub fn write_current(&self) -> Result<()> {
        self.write(std::process::id())
    }

    /// Delete the record; a missing file is not an error
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
