use std::path::{Path, PathBuf};

use ndx_storage::DatabaseOptions;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding [`IndexConfig::index_dir`].
pub const INDEX_DIR_ENV: &str = "NDX_INDEX_DIR";

pub const DEFAULT_FILE_NAME: &str = "types.ndx";

/// Where the index lives and how it is opened.
///
/// Loaded from an `ndx.toml`-style file:
///
/// ```toml
/// index_dir = "/var/cache/ndx"
/// file_name = "types.ndx"
/// exclusive_lock = true
/// flush_on_index = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Directory holding the store. Defaults to `~/.ndx/index`.
    pub index_dir: Option<PathBuf>,
    pub file_name: String,
    /// Refuse to open a store another writer already holds.
    pub exclusive_lock: bool,
    /// Write dirty chunks back after every indexed resource.
    pub flush_on_index: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            file_name: DEFAULT_FILE_NAME.to_string(),
            exclusive_lock: true,
            flush_on_index: true,
        }
    }
}

impl IndexConfig {
    /// Defaults, with the index directory taken from `NDX_INDEX_DIR` if set.
    pub fn from_env() -> Self {
        Self {
            index_dir: std::env::var_os(INDEX_DIR_ENV)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Parses a TOML config file. Unknown keys are rejected.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let dir = match &self.index_dir {
            Some(dir) => dir.clone(),
            None => default_index_dir()?,
        };
        Ok(dir.join(&self.file_name))
    }

    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            exclusive_lock: self.exclusive_lock,
        }
    }
}

fn default_index_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .ok_or(ConfigError::MissingHomeDir)?;
    Ok(PathBuf::from(home).join(".ndx").join("index"))
}
