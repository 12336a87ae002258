//! Runtime configuration
//!
//! Centralized configuration for the compile frontend, execution contexts and
//! the worker driver. Every section can be loaded from the environment and,
//! with the `toml-config` feature, from a TOML file.

pub mod compile;
pub mod context;
pub mod workers;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::compile::{CompileConfig, DEFAULT_STACK_QUOTA, MIN_STACK_QUOTA};
pub use crate::context::ContextConfig;
pub use crate::workers::WorkerConfig;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Compile frontend configuration
    pub compile: CompileConfig,

    /// Per-thread execution context configuration
    pub context: ContextConfig,

    /// Worker driver configuration
    pub workers: WorkerConfig,
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults plus whatever `lookup` resolves.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(&lookup);
        config
    }

    /// Apply variables resolved by `lookup` on top of the current values.
    pub fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.compile.apply_overrides(lookup);
        self.context.apply_overrides(lookup);
        self.workers.apply_overrides(lookup);
    }

    /// Load configuration from TOML file
    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RuntimeConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(_path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Load an optional config file, then let environment variables win.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::from_env());
        };
        let mut config = Self::from_file(path)?;
        config.apply_overrides(&|key: &str| std::env::var(key).ok());
        Ok(config)
    }
}

/// Parse an environment value, keeping `current` when it does not parse.
pub(crate) fn parse_or<T: std::str::FromStr>(value: Option<String>, current: T) -> T {
    value
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(current)
}
