// SPDX-License-Identifier: GPL-3.0-only

pub mod device_bus;
pub mod mount_table;
pub mod network;
pub mod prompt;
pub mod settings;

pub use device_bus::{BusEvent, BusEventStream, DeviceBus};
pub use mount_table::MountTableSource;
pub use network::NetworkMounter;
pub use prompt::PromptProvider;
pub use settings::SettingsStore;
