//! Configuration validation

use crate::Config;
use harbor_core::{Error, Result, SocketType};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;

    validate_application(config)?;

    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;

    if server.host.is_empty() {
        return Err(Error::Config("server host cannot be empty".to_string()));
    }

    if !server.socket_type.is_stream() {
        return Err(Error::Config(format!(
            "socket_type '{}' cannot carry HTTP; use tcp or unix",
            server.socket_type
        )));
    }

    if server.socket_type == SocketType::Tcp && server.port == 0 {
        tracing::warn!("server port is 0, an ephemeral port will be chosen");
    }

    if server.pid_file.as_os_str().is_empty() {
        return Err(Error::Config("pid_file cannot be empty".to_string()));
    }

    if server.log_file.as_os_str().is_empty() {
        return Err(Error::Config("log_file cannot be empty".to_string()));
    }

    if server.shutdown_timeout.is_zero() {
        return Err(Error::Config("shutdown_timeout must be > 0".to_string()));
    }

    if server.shutdown_timeout.as_secs() > 300 {
        tracing::warn!("shutdown_timeout is very high (>5 minutes)");
    }

    Ok(())
}

fn validate_application(config: &Config) -> Result<()> {
    let app = &config.application;

    if app.web.is_empty() {
        return Err(Error::Config("application web directory cannot be empty".to_string()));
    }

    if app.web_config.as_os_str().is_empty() {
        return Err(Error::Config("application web_config cannot be empty".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigBuilder;
    use std::time::Duration;

    #[test]
    fn test_valid_config() {
        let config = ConfigBuilder::new().port(8080).build();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_udp_rejected() {
        let config = ConfigBuilder::new().socket_type(SocketType::Udp).build();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("udp"));
    }

    #[test]
    fn test_zero_shutdown_timeout() {
        let mut config = ConfigBuilder::new().build();
        config.server.shutdown_timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_host() {
        let config = ConfigBuilder::new().host("").build();
        assert!(validate_config(&config).is_err());
    }
}
