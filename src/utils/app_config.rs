/// Config file handling
/// Reads settings from ~/.config/pgkeep/config.toml or an explicit --config path

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::ConfigError;
use crate::utils::constants::{APP_DIR_NAME, CONFIG_FILE_NAME};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub connection: ConnectionSection,
    pub trim: TrimSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimSection {
    pub backup_dir: Option<PathBuf>,
    pub prefix: Option<String>,
    pub include_dbs: Option<Vec<String>>,
    pub include_regex: Option<String>,
    pub include_priority: Option<bool>,
    pub exclude_dbs: Option<Vec<String>>,
    pub exclude_regex: Option<String>,
    pub exclude_templates: Option<bool>,
    pub db_owner: Option<String>,
    pub min_backups: Option<usize>,
    pub expiry_days: Option<u32>,
    pub max_size: Option<SizeSetting>,
    pub pg_warnings: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
}

/// `max_size = 1048576` or `max_size = "500MB"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

impl AppConfig {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present and built-in defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}
