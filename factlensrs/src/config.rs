//! Configuration for FactLens.
//!
//! TOML-based configuration with global defaults and engine-specific pool
//! sections. Per-connection overrides come from the stored connection
//! record itself, not from this file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FactLensError, Result};
use crate::models::DialectKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FactLensConfig {
    pub defaults: GlobalDefaults,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalDefaults {
    pub query: QueryConfig,
    pub postgres: EnginePoolConfig,
    pub mysql: EnginePoolConfig,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Query timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,
}

/// Engine-specific pool defaults, used when a connection record does not
/// carry its own pool size or connect timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnginePoolConfig {
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl Default for EnginePoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            connect_timeout_ms: 5_000,
        }
    }
}

impl FactLensConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FactLensError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| FactLensError::Config(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| FactLensError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `FACTLENS_CONFIG` environment variable
    /// 2. `./factlens.toml` (current directory)
    /// 3. `~/.config/factlens/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("FACTLENS_CONFIG") {
            if let Ok(cfg) = Self::from_file(&path) {
                tracing::info!(path = %path, "loaded config from FACTLENS_CONFIG");
                return cfg;
            }
        }

        if let Ok(cfg) = Self::from_file("factlens.toml") {
            tracing::info!("loaded config from ./factlens.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("factlens").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Pool defaults for one engine.
    pub fn pool_defaults(&self, dialect: DialectKind) -> &EnginePoolConfig {
        match dialect {
            DialectKind::Postgres => &self.defaults.postgres,
            DialectKind::MySql => &self.defaults.mysql,
        }
    }
}
