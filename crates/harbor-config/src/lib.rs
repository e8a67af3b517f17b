//! # Harbor Configuration
//!
//! Configuration management with support for:
//! - Multiple formats (YAML, TOML, JSON)
//! - Environment variable expansion
//! - Command-line overrides
//! - Validation
//! - The once-per-process bootstrap merge

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod bootstrap;
pub mod builder;
pub mod env;
pub mod loader;
pub mod merger;
pub mod types;
pub mod validator;

pub use bootstrap::{bootstrap, resolve_alias, Bootstrap, WEB_ALIAS, WEB_ROOT_ALIAS};
pub use builder::ConfigBuilder;
pub use env::RuntimeEnv;
pub use loader::{load_application, load_config, load_from_file, load_from_str};
pub use merger::{apply_overrides, ServerOverrides};
pub use types::{
    AppConfig, ApplicationSettings, ComponentDefinition, Config, ConnectionDefinition, EnvName,
    ServerConfig,
};
pub use validator::validate_config;

use harbor_core::{Error, Result};
use std::path::Path;

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Unable to detect config format".to_string()))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::Config(format!("Unsupported config format: {}", ext))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("harbor.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("harbor.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("db.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigFormat::from_path(&PathBuf::from("web.php"));
        assert!(result.is_err());
    }
}
