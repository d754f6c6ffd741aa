use ndx_index::IndexError;
use ndx_storage::StorageError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The type has no current, fully indexed declaration. Callers fall back
    /// to decoding the artifact directly.
    #[error("type is not indexed")]
    NotIndexed,

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to decode {index_path}: {source}")]
    Decode {
        index_path: String,
        #[source]
        source: BoxError,
    },
}

impl From<StorageError> for BridgeError {
    fn from(err: StorageError) -> Self {
        BridgeError::Index(err.into())
    }
}

impl BridgeError {
    pub fn is_not_indexed(&self) -> bool {
        matches!(self, BridgeError::NotIndexed)
    }

    /// `true` for failures that only a full index rebuild can clear.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, BridgeError::Index(err) if err.needs_rebuild())
    }
}
