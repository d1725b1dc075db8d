// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use storage_contracts::{MountErrorKind, RequestId};
use storage_types::{DeviceProperties, MountOptions};

/// Filesystem used when formatting from the open path
pub const DEFAULT_FORMAT_FS: &str = "ext4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open,
    Mount { options: MountOptions },
    Unmount,
    Format { fs_type: String },
    Eject,
    Rename { name: String },
    SafelyRemove,
    Properties,
    ForgetShare,
}

impl Action {
    pub fn mount() -> Self {
        Action::Mount {
            options: MountOptions::default(),
        }
    }

    /// Actions that change what is mounted; only one may be in flight per device
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            Action::Open
                | Action::Mount { .. }
                | Action::Unmount
                | Action::Format { .. }
                | Action::Eject
                | Action::SafelyRemove
        )
    }
}

// Display never includes mount credentials.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Open => write!(f, "open"),
            Action::Mount { .. } => write!(f, "mount"),
            Action::Unmount => write!(f, "unmount"),
            Action::Format { fs_type } => write!(f, "format({fs_type})"),
            Action::Eject => write!(f, "eject"),
            Action::Rename { .. } => write!(f, "rename"),
            Action::SafelyRemove => write!(f, "safely_remove"),
            Action::Properties => write!(f, "properties"),
            Action::ForgetShare => write!(f, "forget_share"),
        }
    }
}

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Requested,
    /// Waiting on the user (format confirmation or passphrase)
    Authorizing,
    Executing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorErrorKind {
    AlreadyInProgress,
    Cancelled,
    NotSupported,
    NotFound,
    VaultLocked,
    DeviceBus,
    /// Refusal reported by the privileged mount service
    Mount(MountErrorKind),
    /// Raw errno from mount(2)/umount(2)
    Syscall(i32),
}

impl OrchestratorErrorKind {
    /// Negative codes below -100 belong to the orchestrator; mount service
    /// codes and raw errno values pass through unchanged.
    pub fn code(self) -> i32 {
        match self {
            Self::AlreadyInProgress => -101,
            Self::Cancelled => -102,
            Self::NotSupported => -103,
            Self::NotFound => -104,
            Self::VaultLocked => -105,
            Self::DeviceBus => -106,
            Self::Mount(kind) => kind.wire_code(),
            Self::Syscall(errno) => errno,
        }
    }

    /// Classify an `error_code` returned by the mount service
    pub fn from_service_code(code: i32) -> Self {
        MountErrorKind::from_wire_code(code)
            .map(Self::Mount)
            .unwrap_or(Self::Syscall(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub kind: OrchestratorErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: OrchestratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(OrchestratorErrorKind::Cancelled, "Cancelled by user")
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::NotSupported, message)
    }
}

/// What a successful action produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Success {
    pub mount_point: Option<String>,
    pub properties: Option<DeviceProperties>,
}

impl Success {
    pub fn mounted_at(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: Some(mount_point.into()),
            properties: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub request_id: RequestId,
    pub device_id: String,
    pub action: Action,
    pub success: bool,
    pub error: Option<OrchestratorErrorKind>,
    /// 0 on success, see [`OrchestratorErrorKind::code`] otherwise
    pub error_code: i32,
    pub error_message: String,
    pub mount_point: Option<String>,
    pub properties: Option<DeviceProperties>,
}

impl ActionOutcome {
    pub(crate) fn new(
        request_id: RequestId,
        device_id: &str,
        action: Action,
        result: Result<Success, Failure>,
    ) -> Self {
        let mut outcome = Self {
            request_id,
            device_id: device_id.to_string(),
            action,
            success: false,
            error: None,
            error_code: 0,
            error_message: String::new(),
            mount_point: None,
            properties: None,
        };
        match result {
            Ok(success) => {
                outcome.success = true;
                outcome.mount_point = success.mount_point;
                outcome.properties = success.properties;
            }
            Err(failure) => {
                outcome.error = Some(failure.kind);
                outcome.error_code = failure.kind.code();
                outcome.error_message = failure.message;
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    Phase {
        request_id: RequestId,
        device_id: String,
        phase: ActionPhase,
    },
    Completed(ActionOutcome),
}
