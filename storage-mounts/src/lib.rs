// SPDX-License-Identifier: GPL-3.0-only

//! Client side of COSMIC Ext Mounts
//!
//! Tracks removable drives, network shares and the personal vault, maps them
//! to virtual URLs and runs user actions against them.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod settings;
pub mod subsystem;
pub mod virtual_path;

pub use backend::{BackendDispatch, FileBackend, FileInfo, FileWatcher, WatchEvent};
pub use config::Config;
pub use error::TranslateError;
pub use orchestrator::{Action, ActionOutcome, Orchestrator, OrchestratorEvent, Ticket};
pub use registry::{DeviceRegistry, RegistryEvent};
pub use settings::FileSettingsStore;
pub use subsystem::Subsystem;
pub use virtual_path::{PathTranslator, VirtualUrl};
