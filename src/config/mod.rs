// ABOUTME: Application configuration for agent-pool
// Loads the pool section from TOML files with environment overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session_pool::PoolConfig;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "AGENT_POOL_";

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session pool sizing and timing
    #[serde(default)]
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist and wins outright. Otherwise the first
    /// existing file among the project and user locations is used, falling
    /// back to defaults. Environment overrides apply last in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::get_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides(std::env::vars())?;
        config
            .pool
            .validate()
            .context("Invalid pool configuration")?;

        Ok(config)
    }

    /// Read and parse a single config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Apply `AGENT_POOL_*` sizing overrides from the given variables
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            let target = match name {
                "MAX_SIZE" => &mut self.pool.max_size,
                "KEEP_IDLE_SIZE" => &mut self.pool.keep_idle_size,
                "INITIAL_SIZE" => &mut self.pool.initial_size,
                _ => continue,
            };

            *target = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {key}: {value:?}"))?;
        }

        Ok(())
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".agent-pool").join("config.toml"));
        }

        // 2. User config (~/.agent-pool/config.toml)
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        paths
    }

    /// Get user config directory
    pub fn get_user_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".agent-pool"))
    }
}
