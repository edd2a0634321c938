//! Store configuration loaded from TOML.
//!
//! # Invariants
//! - `db_path = ":memory:"` selects a private in-memory database.
//! - Missing `log_level` falls back to `default_log_level()`.
//! - Without `log_dir` no file logger is started by `Storage::open`.

use crate::db::IN_MEMORY_PATH;
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Settings for one `Storage` context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file path, or `:memory:`.
    pub db_path: PathBuf,
    #[serde(default = "default_level")]
    pub log_level: String,
    /// Absolute directory for rolling log files.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl StorageConfig {
    /// Config for a file-backed store with default logging settings.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            log_level: default_level(),
            log_dir: None,
        }
    }

    /// Config for an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Self::from_toml(&raw)
    }

    /// Parses config from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Writes config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, raw).map_err(ConfigError::Write)
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY_PATH
    }
}

/// Errors from config load/save.
#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Write(std::io::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Serialize(err) => write!(f, "failed to serialize config: {err}"),
            Self::Write(err) => write!(f, "failed to write config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read(err) | Self::Write(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Serialize(err) => Some(err),
        }
    }
}
