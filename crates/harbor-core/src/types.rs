//! Common types used throughout Harbor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How concurrently-arriving requests are dispatched inside the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerMode {
    /// Several workers, each running the full request pipeline independently
    #[default]
    MultiProcess,
    /// A single event loop serving every request
    EventLoop,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiProcess => write!(f, "multi-process"),
            Self::EventLoop => write!(f, "event-loop"),
        }
    }
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "multi-process" | "process" => Ok(Self::MultiProcess),
            "event-loop" | "base" => Ok(Self::EventLoop),
            other => Err(format!("unknown server mode: {other}")),
        }
    }
}

/// Listener transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    /// TCP socket bound to `host:port`
    #[default]
    Tcp,
    /// UDP socket (parsed, but HTTP cannot be served over it)
    Udp,
    /// Unix domain stream socket; `host` is the socket path
    Unix,
}

impl SocketType {
    /// Whether HTTP can be served over this transport
    pub fn is_stream(&self) -> bool {
        !matches!(self, Self::Udp)
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

impl FromStr for SocketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "unix" | "unix-socket" => Ok(Self::Unix),
            other => Err(format!("unknown socket type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_mode_parse() {
        assert_eq!("process".parse::<ServerMode>(), Ok(ServerMode::MultiProcess));
        assert_eq!("event-loop".parse::<ServerMode>(), Ok(ServerMode::EventLoop));
        assert!("threads".parse::<ServerMode>().is_err());
        assert_eq!(ServerMode::EventLoop.to_string(), "event-loop");
    }

    #[test]
    fn test_socket_type() {
        assert_eq!("UNIX".parse::<SocketType>(), Ok(SocketType::Unix));
        assert!(SocketType::Tcp.is_stream());
        assert!(!SocketType::Udp.is_stream());
    }

    #[test]
    fn test_serde_names() {
        let mode: ServerMode = serde_json::from_str("\"multi-process\"").unwrap();
        assert_eq!(mode, ServerMode::MultiProcess);
        let socket: SocketType = serde_json::from_str("\"unix\"").unwrap();
        assert_eq!(socket, SocketType::Unix);
    }
}
