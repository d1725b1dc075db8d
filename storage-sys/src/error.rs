// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{StorageError, StorageErrorKind};
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid mount table line: {0}")]
    InvalidMountInfoLine(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Unknown user: {0}")]
    UnknownUser(u32),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<SysError> for StorageError {
    fn from(err: SysError) -> Self {
        let kind = match &err {
            SysError::InvalidSource(_) | SysError::InvalidMountInfoLine(_) => {
                StorageErrorKind::InvalidInput
            }
            SysError::UnknownUser(_) => StorageErrorKind::NotFound,
            SysError::Io(_) | SysError::OperationFailed(_) => StorageErrorKind::Internal,
        };
        StorageError::new(kind, err.to_string())
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
