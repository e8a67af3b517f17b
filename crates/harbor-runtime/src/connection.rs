//! Database connection collaborator seam
//!
//! The driver itself is external. The worker only opens named connections
//! through a [`ConnectionProvider`] and closes every one it opened when the
//! request ends.

use harbor_config::ConnectionDefinition;
use harbor_core::{Error, Result};
use std::fmt;

/// A checked-out database connection
pub trait Connection: Send + fmt::Debug {
    /// Connection name from the application config
    fn name(&self) -> &str;

    /// Whether the connection is still open
    fn is_active(&self) -> bool;

    /// Close the connection; may block on I/O
    fn close(&mut self) -> Result<()>;
}

/// Opens named connections for a request
pub trait ConnectionProvider: Send + Sync + fmt::Debug {
    /// Open the connection described by `definition`
    fn open(&self, name: &str, definition: &ConnectionDefinition) -> Result<Box<dyn Connection>>;
}

/// Provider used when no database driver is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDriver;

impl ConnectionProvider for NoDriver {
    fn open(&self, name: &str, definition: &ConnectionDefinition) -> Result<Box<dyn Connection>> {
        Err(Error::connection(
            name,
            format!("no database driver installed for '{}'", definition.dsn),
        ))
    }
}
