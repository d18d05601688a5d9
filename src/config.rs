//! Engine configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upper bound on documents accepted by one bulk call.
pub const DEFAULT_BULK_MAX_SIZE: usize = 500;

/// Runtime settings for a [`crate::ProvenanceGraph`].
///
/// ```toml
/// database = "/var/lib/provenance/graph.db"
/// id_allocator = "/var/lib/provenance/ids.db"
/// bulk_max_size = 500
/// admin_application = "purge-service"
/// log_filter = "provenance=info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Graph database file. `None` keeps the graph in memory.
    pub database: Option<PathBuf>,
    /// Id counter file. `None` keeps counters in process memory.
    pub id_allocator: Option<PathBuf>,
    pub bulk_max_size: usize,
    /// Application allowed to update rules it did not create.
    pub admin_application: Option<String>,
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: None,
            id_allocator: None,
            bulk_max_size: DEFAULT_BULK_MAX_SIZE,
            admin_application: None,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Loads the config from `explicit`, or from [`default_config_path`].
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Writes the config to `path`, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(path, serialized).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read engine config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse engine config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize engine config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("failed to write engine config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `<config dir>/provenance/engine.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("provenance").join("engine.toml"))
}
