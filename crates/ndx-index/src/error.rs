use std::path::PathBuf;

use ndx_storage::{SchemaError, StorageError};

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid type descriptor {0:?}")]
    InvalidDescriptor(String),

    #[error("invalid class {descriptor:?}: {reason}")]
    InvalidClass {
        descriptor: String,
        reason: &'static str,
    },
}

impl IndexError {
    /// `true` for structural corruption of the store.
    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexError::Storage(err) if err.is_corruption())
    }

    /// `true` when the only recovery is to rebuild the index from scratch.
    pub fn needs_rebuild(&self) -> bool {
        match self {
            IndexError::Storage(err) => err.needs_rebuild(),
            IndexError::Schema(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to determine home directory for default index path")]
    MissingHomeDir,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
