use std::path::PathBuf;

use thiserror::Error;

use crate::address::Address;
use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("unsupported store version {found} (supported {min}..={max})")]
    VersionMismatch { found: u32, min: u32, max: u32 },
    #[error("unexpected node kind at address {address}: expected {expected}, found {actual}")]
    UnexpectedKind {
        address: Address,
        expected: &'static str,
        actual: String,
    },
    #[error("structural corruption at address {address}: {reason}")]
    Corruption {
        address: Address,
        reason: &'static str,
    },
    #[error("access of {len} bytes at address {address} is outside the heap")]
    OutOfBounds { address: Address, len: usize },
    #[error("allocation of {size} bytes exceeds the maximum block size {max}")]
    AllocationTooLarge { size: u32, max: u32 },
    #[error("invalid allocation pool {0}")]
    InvalidPool(u16),
    #[error("store {path} is locked by another writer")]
    Locked { path: PathBuf },
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl StorageError {
    /// Returns `true` for errors caused by inconsistent on-disk structure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::UnexpectedKind { .. }
                | StorageError::Corruption { .. }
                | StorageError::OutOfBounds { .. }
        )
    }

    /// Returns `true` when the store can only be recovered by rebuilding it
    /// from scratch.
    pub fn needs_rebuild(&self) -> bool {
        self.is_corruption()
            || matches!(
                self,
                StorageError::VersionMismatch { .. } | StorageError::InvalidHeader(_)
            )
    }
}
