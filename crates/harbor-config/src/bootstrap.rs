//! Bootstrap configuration merge
//!
//! Runs once per process before the listener is bound. Precedence, caller
//! value first:
//!
//! | Field                   | Default             | Winner                     |
//! |-------------------------|---------------------|----------------------------|
//! | `document_root`         | `root_dir/app/web`  | `server.document_root`     |
//! | `enable_static_handler` | `true`              | `server.enable_static_handler` |
//! | `@web`                  | `""`                | `app.aliases["@web"]`      |
//! | `@webroot`              | document root       | `app.aliases["@webroot"]`  |

use crate::env::RuntimeEnv;
use crate::types::{AppConfig, ApplicationSettings, ServerConfig};
use harbor_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Alias for the public web path
pub const WEB_ALIAS: &str = "@web";

/// Alias for the document root on disk
pub const WEB_ROOT_ALIAS: &str = "@webroot";

/// Finalized per-process configuration shared read-only by every request
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Server configuration with document root and static handler resolved
    pub server: ServerConfig,
    /// Application template, cloned per request
    pub app: AppConfig,
    /// Process-wide debug/environment constants
    pub env: RuntimeEnv,
}

impl Bootstrap {
    /// Resolved document root
    pub fn document_root(&self) -> Option<&Path> {
        self.server.document_root.as_deref()
    }
}

/// Merge the server config and application template into a [`Bootstrap`]
pub fn bootstrap(
    settings: &ApplicationSettings,
    mut server: ServerConfig,
    mut app: AppConfig,
) -> Result<Bootstrap> {
    let document_root = server
        .document_root
        .take()
        .unwrap_or_else(|| settings.web_root());
    let document_root_str = document_root
        .to_str()
        .ok_or_else(|| {
            Error::Config(format!(
                "document root is not valid UTF-8: {}",
                document_root.display()
            ))
        })?
        .to_string();

    server.document_root = Some(document_root);
    server.enable_static_handler = Some(server.enable_static_handler.unwrap_or(true));

    app.aliases = merge_aliases(default_aliases(&document_root_str), app.aliases);

    let env = *RuntimeEnv::new(settings.debug, settings.env).install();

    tracing::info!(
        document_root = %document_root_str,
        static_handler = server.static_handler_enabled(),
        debug = env.debug,
        env = %env.env,
        "Bootstrap configuration merged"
    );

    Ok(Bootstrap { server, app, env })
}

fn default_aliases(document_root: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (WEB_ALIAS.to_string(), String::new()),
        (WEB_ROOT_ALIAS.to_string(), document_root.to_string()),
    ])
}

/// Merge alias maps; entries in `caller` win
pub fn merge_aliases(
    mut defaults: BTreeMap<String, String>,
    caller: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    defaults.extend(caller);
    defaults
}

/// Resolve `@alias/rest` against an alias map
pub fn resolve_alias(aliases: &BTreeMap<String, String>, path: &str) -> Option<PathBuf> {
    if !path.starts_with('@') {
        return Some(PathBuf::from(path));
    }

    let (name, rest) = match path.find('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => (path, ""),
    };

    let base = aliases.get(name)?;
    let mut resolved = PathBuf::from(base);
    if !rest.is_empty() {
        resolved.push(rest);
    }
    Some(resolved)
}
