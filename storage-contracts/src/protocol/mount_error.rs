// SPDX-License-Identifier: GPL-3.0-only

//! Error taxonomy of the privileged mount service
//!
//! On the wire a service error travels as its negated code, while a raw OS
//! failure travels as the positive errno. Zero means success.

use serde::{Deserialize, Serialize};
use storage_types::{MountResult, UnmountResult};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountErrorKind {
    NotSupportedScheme,
    CannotGenerateMountPath,
    CannotMkdirMountPoint,
    /// Idempotent short-circuit; reported with success
    AlreadyMounted,
    NotExist,
    NotMountByDaemon,
    NotCifs,
    NotOwner,
    NotOwnerOfMount,
}

impl MountErrorKind {
    pub const ALL: [MountErrorKind; 9] = [
        Self::NotSupportedScheme,
        Self::CannotGenerateMountPath,
        Self::CannotMkdirMountPoint,
        Self::AlreadyMounted,
        Self::NotExist,
        Self::NotMountByDaemon,
        Self::NotCifs,
        Self::NotOwner,
        Self::NotOwnerOfMount,
    ];

    pub fn code(self) -> i32 {
        match self {
            Self::NotSupportedScheme => 1,
            Self::CannotGenerateMountPath => 2,
            Self::CannotMkdirMountPoint => 3,
            Self::AlreadyMounted => 4,
            Self::NotExist => 5,
            Self::NotMountByDaemon => 6,
            Self::NotCifs => 7,
            Self::NotOwner => 8,
            Self::NotOwnerOfMount => 9,
        }
    }

    pub fn wire_code(self) -> i32 {
        -self.code()
    }

    pub fn from_wire_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountError {
    #[error("{message}")]
    Service {
        kind: MountErrorKind,
        message: String,
    },

    /// Raw OS failure from mount(2)/umount(2), passed through unmodified
    #[error("{message} (errno {errno})")]
    Syscall { errno: i32, message: String },
}

impl MountError {
    pub fn service(kind: MountErrorKind, message: impl Into<String>) -> Self {
        Self::Service {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<MountErrorKind> {
        match self {
            Self::Service { kind, .. } => Some(*kind),
            Self::Syscall { .. } => None,
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Self::Service { kind, .. } => kind.wire_code(),
            Self::Syscall { errno, .. } => *errno,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Service { message, .. } | Self::Syscall { message, .. } => message,
        }
    }
}

impl From<MountError> for MountResult {
    fn from(err: MountError) -> Self {
        MountResult::failure(err.error_code(), err.message())
    }
}

impl From<MountError> for UnmountResult {
    fn from(err: MountError) -> Self {
        UnmountResult::failure(err.error_code(), err.message())
    }
}
