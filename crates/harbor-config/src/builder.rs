//! Configuration builder

use crate::types::{ApplicationSettings, Config, ServerConfig};
use harbor_core::{ServerMode, SocketType};
use std::path::PathBuf;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    server: ServerConfig,
    application: ApplicationSettings,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server configuration
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Set application settings
    pub fn application(mut self, application: ApplicationSettings) -> Self {
        self.application = application;
        self
    }

    /// Set bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    /// Set bind port
    pub fn port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Set dispatch mode
    pub fn mode(mut self, mode: ServerMode) -> Self {
        self.server.mode = mode;
        self
    }

    /// Set listener transport
    pub fn socket_type(mut self, socket_type: SocketType) -> Self {
        self.server.socket_type = socket_type;
        self
    }

    /// Set PID file path
    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.server.pid_file = path.into();
        self
    }

    /// Set log file path
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.server.log_file = path.into();
        self
    }

    /// Set the project root directory
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.application.root_dir = path.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        Config {
            server: self.server,
            application: self.application,
        }
    }
}
