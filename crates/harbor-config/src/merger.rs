//! Command-line overrides on top of the configuration file
//!
//! Flags given on the command line win over values from the file; absent
//! flags leave the file value alone.

use crate::types::Config;
use harbor_core::{ServerMode, SocketType};

/// Server settings that can be overridden per invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOverrides {
    /// Bind host
    pub host: Option<String>,
    /// Bind port
    pub port: Option<u16>,
    /// Dispatch mode
    pub mode: Option<ServerMode>,
    /// Listener transport
    pub socket_type: Option<SocketType>,
}

impl ServerOverrides {
    /// Whether no override is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Apply overrides to a loaded configuration
pub fn apply_overrides(mut config: Config, overrides: ServerOverrides) -> Config {
    if let Some(host) = overrides.host {
        config.server.host = host;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(mode) = overrides.mode {
        config.server.mode = mode;
    }
    if let Some(socket_type) = overrides.socket_type {
        config.server.socket_type = socket_type;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigBuilder;

    #[test]
    fn test_overrides_win() {
        let config = ConfigBuilder::new().host("127.0.0.1").port(8080).build();

        let merged = apply_overrides(
            config,
            ServerOverrides {
                port: Some(9999),
                mode: Some(ServerMode::EventLoop),
                ..Default::default()
            },
        );

        assert_eq!(merged.server.host, "127.0.0.1");
        assert_eq!(merged.server.port, 9999);
        assert_eq!(merged.server.mode, ServerMode::EventLoop);
        assert_eq!(merged.server.socket_type, SocketType::Tcp);
    }

    #[test]
    fn test_empty_overrides() {
        let config = ConfigBuilder::new().port(8080).build();
        let overrides = ServerOverrides::default();
        assert!(overrides.is_empty());

        let merged = apply_overrides(config.clone(), overrides);
        assert_eq!(merged, config);
    }
}
