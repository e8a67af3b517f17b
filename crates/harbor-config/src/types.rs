//! Configuration types

use harbor_core::{ServerMode, SocketType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Worker process settings
    pub server: ServerConfig,

    /// Where the application lives and how it runs
    #[serde(default)]
    pub application: ApplicationSettings,
}

/// Worker process configuration
///
/// Immutable once the server has started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Bind host (socket path for unix sockets)
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Dispatch mode
    #[serde(default)]
    pub mode: ServerMode,

    /// Listener transport
    #[serde(default)]
    pub socket_type: SocketType,

    /// PID file written by the running worker
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Log file for the worker
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Static document root (defaults to the application's web directory)
    #[serde(default)]
    pub document_root: Option<PathBuf>,

    /// Serve files under the document root without running the application
    #[serde(default)]
    pub enable_static_handler: Option<bool>,

    /// Worker threads in multi-process mode (0 = auto)
    #[serde(default)]
    pub worker_num: usize,

    /// Background task workers (0 = task dispatch disabled)
    #[serde(default)]
    pub task_worker_num: usize,

    /// Graceful shutdown timeout (wait for in-flight requests)
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Extra runtime options passed through untouched
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ServerConfig {
    /// `host:port` (or the socket path for unix sockets)
    pub fn listen_label(&self) -> String {
        match self.socket_type {
            SocketType::Unix => self.host.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Whether the static handler is on once bootstrap defaults are applied
    pub fn static_handler_enabled(&self) -> bool {
        self.enable_static_handler.unwrap_or(true) && self.document_root.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: ServerMode::default(),
            socket_type: SocketType::default(),
            pid_file: default_pid_file(),
            log_file: default_log_file(),
            document_root: None,
            enable_static_handler: None,
            worker_num: 0,
            task_worker_num: 0,
            shutdown_timeout: default_shutdown_timeout(),
            options: BTreeMap::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("runtime/harbor.pid")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("runtime/logs/harbor.log")
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Application location and process-wide flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Project root directory
    pub root_dir: PathBuf,

    /// Application sub-directory under the root (may be empty)
    pub app: String,

    /// Web directory under the application
    pub web: String,

    /// Debug mode (process-wide, first write wins)
    pub debug: bool,

    /// Environment name (process-wide, first write wins)
    pub env: EnvName,

    /// Application config file, relative to `root_dir`
    pub web_config: PathBuf,

    /// Connection definitions file, relative to `root_dir`
    pub db_config: PathBuf,
}

impl ApplicationSettings {
    /// `root_dir/app/web`
    pub fn web_root(&self) -> PathBuf {
        let mut path = self.root_dir.clone();
        if !self.app.is_empty() {
            path.push(&self.app);
        }
        path.push(&self.web);
        path
    }
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            app: String::new(),
            web: "web".to_string(),
            debug: false,
            env: EnvName::Prod,
            web_config: PathBuf::from("config/web.yaml"),
            db_config: PathBuf::from("config/db.yaml"),
        }
    }
}

/// Environment name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvName {
    /// Development
    Dev,
    /// Production
    #[default]
    Prod,
    /// Test
    Test,
}

impl std::fmt::Display for EnvName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Prod => write!(f, "prod"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Application configuration template
///
/// Built once at bootstrap and cloned for every request; a clone is never
/// written back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Application identifier
    pub id: String,

    /// Named component definitions
    pub components: BTreeMap<String, ComponentDefinition>,

    /// Path aliases (`@name` → path)
    pub aliases: BTreeMap<String, String>,

    /// Named database connections
    pub connections: BTreeMap<String, ConnectionDefinition>,

    /// Free-form application parameters
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl AppConfig {
    /// Look up a component definition
    pub fn component(&self, name: &str) -> Option<&ComponentDefinition> {
        self.components.get(name)
    }

    /// Merge `overlay` into the named component, creating it when absent
    pub fn override_component(&mut self, name: &str, overlay: ComponentDefinition) {
        let merged = match self.components.remove(name) {
            Some(base) => base.merged_with(overlay),
            None => overlay,
        };
        self.components.insert(name.to_string(), merged);
    }
}

/// Configuration of one application component
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentDefinition {
    /// Implementation class/kind name
    #[serde(default)]
    pub class: Option<String>,

    /// Remaining component properties
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ComponentDefinition {
    /// A definition naming only its class
    pub fn with_class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            properties: serde_json::Map::new(),
        }
    }

    /// Set a property
    pub fn property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Merge an override on top of this definition; the override wins per key
    pub fn merged_with(mut self, overlay: ComponentDefinition) -> ComponentDefinition {
        if overlay.class.is_some() {
            self.class = overlay.class;
        }
        for (key, value) in overlay.properties {
            self.properties.insert(key, value);
        }
        self
    }
}

/// A named database connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionDefinition {
    /// Data source name
    pub dsn: String,

    /// User name
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,

    /// Driver-specific options
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_merge_override_wins() {
        let base = ComponentDefinition::with_class("FileCache")
            .property("path", json!("/tmp/cache"))
            .property("ttl", json!(60));
        let overlay = ComponentDefinition::default().property("ttl", json!(5));

        let merged = base.merged_with(overlay);
        assert_eq!(merged.class.as_deref(), Some("FileCache"));
        assert_eq!(merged.properties["ttl"], json!(5));
        assert_eq!(merged.properties["path"], json!("/tmp/cache"));
    }

    #[test]
    fn test_override_component_creates_missing() {
        let mut app = AppConfig::default();
        app.override_component("request", ComponentDefinition::with_class("RequestAdapter"));
        assert_eq!(
            app.component("request").unwrap().class.as_deref(),
            Some("RequestAdapter")
        );
    }

    #[test]
    fn test_web_root() {
        let settings = ApplicationSettings {
            root_dir: PathBuf::from("/srv/site"),
            app: "frontend".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.web_root(), PathBuf::from("/srv/site/frontend/web"));

        let flat = ApplicationSettings {
            root_dir: PathBuf::from("/srv/site"),
            ..Default::default()
        };
        assert_eq!(flat.web_root(), PathBuf::from("/srv/site/web"));
    }

    #[test]
    fn test_listen_label() {
        let mut server = ServerConfig::default();
        assert_eq!(server.listen_label(), "0.0.0.0:9999");
        server.socket_type = SocketType::Unix;
        server.host = "/tmp/harbor.sock".to_string();
        assert_eq!(server.listen_label(), "/tmp/harbor.sock");
    }
}
