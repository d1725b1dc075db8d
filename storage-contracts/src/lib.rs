// SPDX-License-Identifier: GPL-3.0-only

pub mod client;
pub mod protocol;
pub mod traits;

pub use protocol::{MountError, MountErrorKind, RequestId, StorageError, StorageErrorKind};
pub use traits::{
    BusEvent, BusEventStream, DeviceBus, MountTableSource, NetworkMounter, PromptProvider,
    SettingsStore,
};
