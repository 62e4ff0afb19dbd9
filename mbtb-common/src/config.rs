//! Configuration loading and database path resolution
//!
//! Bootstrap configuration comes from a TOML file. Every field has a
//! built-in default, so a missing or partial file never prevents startup.
//!
//! # Database Path Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MBTB_DATABASE`)
//! 3. TOML `database_path`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the database location
pub const DATABASE_ENV_VAR: &str = "MBTB_DATABASE";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingestion tuning (optional)
    #[serde(default)]
    pub ingest: IngestSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Ingestion settings
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSettings {
    /// Maximum total time spent retrying a specimen write while the
    /// database reports lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

impl TomlConfig {
    /// Load configuration from `path`
    ///
    /// A missing file yields defaults with a warning; a file that exists
    /// but cannot be parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, or from the platform default location
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) => Self::load(&path),
                None => {
                    warn!("Could not determine config directory, using built-in defaults");
                    Ok(Self::default())
                }
            },
        }
    }
}

/// Default configuration file path for the platform
///
/// `~/.config/mbtb/config.toml` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mbtb").join("config.toml"))
}

/// Resolve the database file path following the priority order above
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_database_path()
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mbtb").join("mbtb.db"))
        .unwrap_or_else(|| PathBuf::from("./mbtb_data/mbtb.db"))
}
