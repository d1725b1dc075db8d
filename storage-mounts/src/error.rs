// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{StorageError, StorageErrorKind};
use thiserror::Error;

/// Failures translating or accessing virtual URLs
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device is not mounted: {0}")]
    NotMounted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch failed: {0}")]
    Watch(#[from] notify::Error),
}

impl From<TranslateError> for StorageError {
    fn from(err: TranslateError) -> Self {
        let kind = match &err {
            TranslateError::InvalidUrl(_) => StorageErrorKind::InvalidInput,
            TranslateError::UnsupportedScheme(_) => StorageErrorKind::Unsupported,
            TranslateError::UnknownDevice(_) => StorageErrorKind::NotFound,
            TranslateError::NotMounted(_) => StorageErrorKind::Unavailable,
            TranslateError::Io(_) | TranslateError::Watch(_) => StorageErrorKind::Internal,
        };
        StorageError::new(kind, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
