//! Bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execute::ArgOrder;
use crate::graph::DEFAULT_MAX_STEPS;

/// Environment variable overriding [`BridgeConfig::library_path`].
pub const ENV_LIBRARY: &str = "TETHER_LIBRARY";

/// Environment variable overriding [`BridgeConfig::engine_prefix`].
pub const ENV_ENGINE_PREFIX: &str = "TETHER_ENGINE_PREFIX";

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Prefix of every engine entry point (`<prefix>_<Type>_<op>`)
    pub engine_prefix: String,

    /// Path to the engine's shared library
    pub library_path: Option<PathBuf>,

    /// Upper bound on node executions in one graph run
    pub max_graph_steps: usize,

    /// Order in which `<prefix>_Executor_run` takes the callback pair
    pub executor_arg_order: ArgOrder,

    /// Panic on correlation-store misuse instead of returning an error.
    /// On by default in debug builds. Inside a native callback the panic is
    /// caught and logged; the invocation produces no output.
    pub strict_callbacks: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine_prefix: "engine".to_string(),
            library_path: None,
            max_graph_steps: DEFAULT_MAX_STEPS,
            executor_arg_order: ArgOrder::ContextFirst,
            strict_callbacks: cfg!(debug_assertions),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::debug!("loaded bridge config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Defaults, with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `TETHER_LIBRARY` and `TETHER_ENGINE_PREFIX` if set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_LIBRARY).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides library path: {}", ENV_LIBRARY, path);
            self.library_path = Some(PathBuf::from(path));
        }
        if let Some(prefix) = lookup(ENV_ENGINE_PREFIX).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides engine prefix: {}", ENV_ENGINE_PREFIX, prefix);
            self.engine_prefix = prefix;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine_prefix.is_empty() {
            return Err(Error::Config("engine_prefix must not be empty".to_string()));
        }
        if !self
            .engine_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "engine_prefix '{}' is not a valid symbol prefix",
                self.engine_prefix
            )));
        }
        if self.max_graph_steps == 0 {
            return Err(Error::Config("max_graph_steps must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The configured library path, or a config error naming the override.
    pub fn require_library(&self) -> Result<&Path> {
        self.library_path.as_deref().ok_or_else(|| {
            Error::Config(format!("no library_path configured and {} is unset", ENV_LIBRARY))
        })
    }
}
