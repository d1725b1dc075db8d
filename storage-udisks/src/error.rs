// SPDX-License-Identifier: GPL-3.0-only

//! Error types for UDisks2 operations

use storage_contracts::{StorageError, StorageErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Device is busy: {0}")]
    ResourceBusy(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("D-Bus error: {0}")]
    DBusError(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Zbus Error")]
    ZbusError(#[from] zbus::Error),

    #[error("UDisks2 error: {0}")]
    UDisks(#[from] udisks2::Error),
}

impl DiskError {
    /// Classify a failed UDisks2 method call by its error name
    pub(crate) fn from_call(action: &str, target: &str, err: udisks2::Error) -> Self {
        match err {
            udisks2::Error::NotSupported => DiskError::NotSupported(format!("{action} {target}")),
            udisks2::Error::DeviceBusy => DiskError::ResourceBusy(target.to_string()),
            udisks2::Error::NotAuthorized
            | udisks2::Error::NotAuthorizedCanObtain
            | udisks2::Error::NotAuthorizedDismissed => {
                DiskError::NotAuthorized(format!("{action} {target}"))
            }
            udisks2::Error::Zbus(err) => Self::from_message(action, target, err.to_string()),
            other => DiskError::OperationFailed(format!("{action} {target} failed: {other}")),
        }
    }

    /// Classify a raw D-Bus failure by the error name embedded in its message
    fn from_message(action: &str, target: &str, msg: String) -> Self {
        if is_not_supported(&msg) {
            DiskError::NotSupported(format!("{action} {target}"))
        } else if is_device_busy(&msg) {
            DiskError::ResourceBusy(target.to_string())
        } else if is_not_authorized(&msg) {
            DiskError::NotAuthorized(format!("{action} {target}"))
        } else {
            DiskError::OperationFailed(format!("{action} {target} failed: {msg}"))
        }
    }
}

fn is_not_supported(msg: &str) -> bool {
    msg.contains("NotSupported") || msg.contains("not supported") || msg.contains("No such interface")
}

fn is_device_busy(msg: &str) -> bool {
    msg.contains("DeviceBusy") || msg.contains("Device or resource busy")
}

fn is_not_authorized(msg: &str) -> bool {
    msg.contains("NotAuthorized")
}

impl From<DiskError> for StorageError {
    fn from(err: DiskError) -> Self {
        let kind = match &err {
            DiskError::DeviceNotFound(_) => StorageErrorKind::NotFound,
            DiskError::NotSupported(_) => StorageErrorKind::Unsupported,
            DiskError::ResourceBusy(_) => StorageErrorKind::Busy,
            DiskError::NotAuthorized(_) => StorageErrorKind::PermissionDenied,
            DiskError::ConnectionFailed(_) => StorageErrorKind::Unavailable,
            DiskError::DBusError(_)
            | DiskError::OperationFailed(_)
            | DiskError::ZbusError(_)
            | DiskError::UDisks(_) => StorageErrorKind::Internal,
        };
        StorageError::new(kind, err.to_string())
    }
}
