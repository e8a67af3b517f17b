//! Process-wide debug/environment constants
//!
//! Defined once per process; later definitions are ignored.

use crate::types::EnvName;
use once_cell::sync::OnceCell;

static RUNTIME_ENV: OnceCell<RuntimeEnv> = OnceCell::new();

/// Debug flag and environment name for the whole process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeEnv {
    /// Debug mode
    pub debug: bool,
    /// Environment name
    pub env: EnvName,
}

impl RuntimeEnv {
    /// Create an uninstalled value
    pub fn new(debug: bool, env: EnvName) -> Self {
        Self { debug, env }
    }

    /// Install as the process value; the first installed value wins
    ///
    /// Returns the value actually in effect.
    pub fn install(self) -> &'static RuntimeEnv {
        let installed = RUNTIME_ENV.get_or_init(|| self);
        if *installed != self {
            tracing::warn!(
                debug = installed.debug,
                env = %installed.env,
                "Runtime environment already defined, ignoring redefinition"
            );
        }
        installed
    }

    /// The installed value, if any
    pub fn current() -> Option<&'static RuntimeEnv> {
        RUNTIME_ENV.get()
    }

    /// Whether this is a development environment
    pub fn is_dev(&self) -> bool {
        self.env == EnvName::Dev
    }
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self::new(false, EnvName::Prod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let first = RuntimeEnv::new(true, EnvName::Dev).install();
        let second = RuntimeEnv::new(false, EnvName::Prod).install();

        assert_eq!(first, second);
        assert_eq!(RuntimeEnv::current(), Some(first));
    }
}
