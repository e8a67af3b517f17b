//! Configuration loading

use crate::types::{AppConfig, ApplicationSettings, ConnectionDefinition};
use crate::{Config, ConfigFormat};
use harbor_core::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// Load the main configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    parse_file(path.as_ref())
}

/// Read, expand and deserialize any configuration file
fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    let format = ConfigFormat::from_path(path)?;

    parse_str(&content, format)
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut result = String::new();
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match default_value {
                Some(default) => default.to_string(),
                None => {
                    return Err(Error::Config(format!(
                        "Environment variable '{}' not set and no default provided",
                        var_name.as_str()
                    )));
                }
            },
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T> {
    let expanded_content = expand_env_vars(content)?;

    let value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(value)
}

/// Load the main configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    parse_str(content, format)
}

/// Load and validate the main configuration
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;

    crate::validator::validate_config(&config)?;

    Ok(config)
}

/// Load the application template and its connection definitions
///
/// Both files are resolved against `settings.root_dir`; either one missing
/// is a startup-fatal configuration error.
pub fn load_application(settings: &ApplicationSettings) -> Result<AppConfig> {
    let web_path = settings.root_dir.join(&settings.web_config);
    let mut app: AppConfig = parse_file(&web_path)?;

    let db_path = settings.root_dir.join(&settings.db_config);
    let connections: BTreeMap<String, ConnectionDefinition> = parse_file(&db_path)?;

    for (name, definition) in connections {
        app.connections.insert(name, definition);
    }

    tracing::debug!(
        web_config = %web_path.display(),
        db_config = %db_path.display(),
        components = app.components.len(),
        connections = app.connections.len(),
        "Application configuration loaded"
    );

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML_CONFIG: &str = r#"
server:
  host: "127.0.0.1"
  port: 9501
  mode: event-loop
  socket_type: tcp
  pid_file: "/tmp/harbor-test/harbor.pid"
  log_file: "/tmp/harbor-test/harbor.log"
  shutdown_timeout: "5s"
  options:
    package_max_length: 2097152

application:
  root_dir: "/srv/site"
  web: "public"
  debug: true
  env: dev
"#;

    #[test]
    fn test_load_yaml() {
        let config = load_from_str(YAML_CONFIG, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.server.port, 9501);
        assert_eq!(config.server.mode, harbor_core::ServerMode::EventLoop);
        assert_eq!(config.server.shutdown_timeout.as_secs(), 5);
        assert_eq!(config.server.options.len(), 1);
        assert!(config.application.debug);
        assert_eq!(config.application.web, "public");
    }

    #[test]
    fn test_invalid_yaml() {
        let invalid = "invalid: [yaml";
        let result = load_from_str(invalid, ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_var_with_default() {
        env::remove_var("HARBOR_UNDEFINED_PORT");

        let config = load_from_str(
            "server:\n  port: ${HARBOR_UNDEFINED_PORT:-8088}\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.server.port, 8088);
    }

    #[test]
    fn test_missing_env_var_no_default() {
        env::remove_var("HARBOR_MISSING_VAR");

        let result = load_from_str("server:\n  host: ${HARBOR_MISSING_VAR}\n", ConfigFormat::Yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("HARBOR_MISSING_VAR"));
    }

    #[test]
    fn test_multiple_env_vars() {
        env::set_var("HARBOR_DB_HOST", "localhost");
        env::set_var("HARBOR_DB_PORT", "5432");

        let expanded = expand_env_vars("pgsql:host=${HARBOR_DB_HOST};port=${HARBOR_DB_PORT}").unwrap();
        assert_eq!(expanded, "pgsql:host=localhost;port=5432");

        env::remove_var("HARBOR_DB_HOST");
        env::remove_var("HARBOR_DB_PORT");
    }

    #[test]
    fn test_load_application() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();

        let mut web = fs::File::create(dir.path().join("config/web.yaml")).unwrap();
        writeln!(
            web,
            "id: basic\ncomponents:\n  cache:\n    class: FileCache\n    path: /tmp/cache\naliases:\n  \"@assets\": /srv/assets\n"
        )
        .unwrap();

        let mut db = fs::File::create(dir.path().join("config/db.yaml")).unwrap();
        writeln!(db, "db:\n  dsn: \"sqlite::memory:\"\n").unwrap();

        let settings = ApplicationSettings {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let app = load_application(&settings).unwrap();

        assert_eq!(app.id, "basic");
        assert_eq!(app.components["cache"].class.as_deref(), Some("FileCache"));
        assert_eq!(app.connections["db"].dsn, "sqlite::memory:");
        assert_eq!(app.aliases["@assets"], "/srv/assets");
    }

    #[test]
    fn test_load_application_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ApplicationSettings {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let err = load_application(&settings).unwrap_err();
        assert_eq!(err.category(), harbor_core::ErrorCategory::StartupFatal);
    }
}
