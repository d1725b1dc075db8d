// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 implementation of the device bus.
//!
//! Block volumes are read through the `udisks2` proxies and turned into
//! [`storage_types::BlockVolumeInfo`] observations; add/remove/property
//! change signals are folded into one [`storage_contracts::BusEventStream`].

mod bytestring;

pub mod bus;
pub mod error;
pub mod manager;
pub mod volume;

pub use bus::UDisksBus;
pub use error::DiskError;
pub use manager::{UDisks2ManagerProxy, UDisks2ObjectManagerProxy, device_event_stream};
