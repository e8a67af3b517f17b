//! Request-scoped resource registry
//!
//! Every resource acquired while handling a request is registered here and
//! released exactly once when the request ends. Release order is fixed:
//! connections, then uploaded files, then log buffers, so the flushed logs
//! include the outcome of every close.

use crate::connection::Connection;
use crate::log::{LogBuffer, LogLevel};
use harbor_core::{Error, Result};
use std::fmt;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// Identifier returned by [`ResourceRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

/// Resource kinds, in release order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Database connection
    DatabaseConnection,
    /// Uploaded temp file
    UploadedFile,
    /// Log buffer
    LogBuffer,
}

/// A file uploaded with the request and parked in a temp location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-supplied file name
    pub name: String,
    /// Temp location on disk
    pub temp_path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl UploadedFile {
    /// Remove the temp file; a file already moved away is not an error
    fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::resource(
                format!("upload {}", self.temp_path.display()),
                e.to_string(),
            )),
        }
    }
}

/// A request-scoped resource
pub enum ResourceHandle {
    /// Checked-out database connection
    DatabaseConnection(Box<dyn Connection>),
    /// Uploaded temp file
    UploadedFile(UploadedFile),
    /// Buffered log records
    LogBuffer(LogBuffer),
}

impl ResourceHandle {
    /// Kind of resource
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::DatabaseConnection(_) => ResourceKind::DatabaseConnection,
            Self::UploadedFile(_) => ResourceKind::UploadedFile,
            Self::LogBuffer(_) => ResourceKind::LogBuffer,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::DatabaseConnection(conn) => format!("connection '{}'", conn.name()),
            Self::UploadedFile(file) => format!("upload '{}'", file.name),
            Self::LogBuffer(_) => "log buffer".to_string(),
        }
    }

    fn release(&mut self) -> Result<()> {
        match self {
            Self::DatabaseConnection(conn) => {
                if conn.is_active() {
                    conn.close()
                } else {
                    Ok(())
                }
            }
            Self::UploadedFile(file) => file.reset(),
            Self::LogBuffer(buffer) => {
                buffer.flush(false);
                buffer.flush(true);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle")
            .field(&self.describe())
            .finish()
    }
}

/// Outcome of [`ResourceRegistry::release_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Resources released cleanly
    pub released: usize,
    /// Resources whose release failed
    pub failed: usize,
}

/// Tracks the resources of one request
#[derive(Default)]
pub struct ResourceRegistry {
    next_id: u64,
    handles: Vec<(ResourceId, ResourceHandle)>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource for release at request end
    pub fn register(&mut self, handle: ResourceHandle) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        tracing::trace!(resource = %handle.describe(), "Resource registered");
        self.handles.push((id, handle));
        id
    }

    /// Access a registered resource
    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut ResourceHandle> {
        self.handles
            .iter_mut()
            .find(|(handle_id, _)| *handle_id == id)
            .map(|(_, handle)| handle)
    }

    /// Number of resources still held
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of held resources of one kind
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.handles
            .iter()
            .filter(|(_, handle)| handle.kind() == kind)
            .count()
    }

    /// Release every held resource
    ///
    /// Failures are logged and counted; they never stop the remaining
    /// releases. Calling this again releases nothing.
    pub fn release_all(&mut self) -> ReleaseReport {
        let mut handles: Vec<ResourceHandle> =
            self.handles.drain(..).map(|(_, handle)| handle).collect();
        if handles.is_empty() {
            return ReleaseReport::default();
        }
        handles.sort_by_key(ResourceHandle::kind);

        let mut report = ReleaseReport::default();
        let mut outcomes: Vec<(LogLevel, String)> = Vec::new();

        for mut handle in handles {
            if let ResourceHandle::LogBuffer(buffer) = &handle {
                for (level, message) in &outcomes {
                    buffer.log(*level, "harbor.teardown", message.clone());
                }
            }

            let description = handle.describe();
            let released = panic::catch_unwind(AssertUnwindSafe(|| handle.release()))
                .unwrap_or_else(|payload| Err(Error::Internal(panic_message(&*payload))));
            match released {
                Ok(()) => {
                    report.released += 1;
                    if handle.kind() != ResourceKind::LogBuffer {
                        outcomes.push((LogLevel::Trace, format!("released {description}")));
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(resource = %description, error = %e, "Resource release failed");
                    outcomes.push((LogLevel::Error, format!("failed to release {description}: {e}")));
                }
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("release panicked: {detail}")
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("held", &self.handles.len())
            .finish()
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            tracing::warn!(
                held = self.handles.len(),
                "Registry dropped with live resources, releasing"
            );
            self.release_all();
        }
    }
}
