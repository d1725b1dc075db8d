// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus client wrappers for the privileged mount service

pub mod connection;
pub mod error;
pub mod mount_control;

pub use error::ClientError;
pub use mount_control::{MountControlClient, MountControlInterfaceProxy};
