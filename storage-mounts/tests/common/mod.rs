// SPDX-License-Identifier: GPL-3.0-only

//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storage_contracts::{
    BusEventStream, DeviceBus, MountTableSource, NetworkMounter, PromptProvider, SettingsStore,
    StorageError, StorageErrorKind,
};
use storage_mounts::{DeviceRegistry, Orchestrator};
use storage_sys::VaultLayout;
use storage_types::{
    AliasEntry, AppEntryRegistration, BlockVolumeInfo, Device, MountEntry, MountOptions,
    MountResult, MountTable, NetworkShareRegistration, UnmountResult,
};
use tokio::sync::Notify;

pub const CLEARTEXT_BUS_PATH: &str = "/b/dm_0";
pub const PASSPHRASE: &str = "correct horse";

#[derive(Default)]
pub struct FakeTable {
    entries: Mutex<Vec<MountEntry>>,
}

impl FakeTable {
    pub fn mount(&self, source: &str, target: &str, fs_type: &str) {
        self.entries.lock().unwrap().push(MountEntry {
            source: source.into(),
            target: target.into(),
            fs_type: fs_type.into(),
            options: vec!["rw".into()],
        });
    }

    pub fn unmount_source(&self, source: &str) {
        self.entries.lock().unwrap().retain(|e| e.source != source);
    }
}

impl MountTableSource for FakeTable {
    fn snapshot(&self) -> Result<MountTable, StorageError> {
        Ok(MountTable::new(self.entries.lock().unwrap().clone()))
    }
}

pub struct FakeBus {
    volumes: Mutex<BTreeMap<String, BlockVolumeInfo>>,
    table: Arc<FakeTable>,
    calls: Mutex<Vec<String>>,
    /// When set, `mount` waits for a permit before doing anything
    mount_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBus {
    pub fn new(table: Arc<FakeTable>, volumes: Vec<BlockVolumeInfo>) -> Self {
        Self {
            volumes: Mutex::new(volumes.into_iter().map(|v| (v.bus_path.clone(), v)).collect()),
            table,
            calls: Mutex::default(),
            mount_gate: Mutex::default(),
        }
    }

    pub fn gate_mounts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.mount_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn get(&self, bus_path: &str) -> Result<BlockVolumeInfo, StorageError> {
        self.volumes
            .lock()
            .unwrap()
            .get(bus_path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(bus_path))
    }
}

#[async_trait]
impl DeviceBus for FakeBus {
    async fn enumerate(&self) -> Result<Vec<BlockVolumeInfo>, StorageError> {
        Ok(self.volumes.lock().unwrap().values().cloned().collect())
    }

    async fn volume(&self, bus_path: &str) -> Result<Option<BlockVolumeInfo>, StorageError> {
        Ok(self.volumes.lock().unwrap().get(bus_path).cloned())
    }

    async fn events(&self) -> Result<BusEventStream, StorageError> {
        Err(StorageError::new(StorageErrorKind::Unavailable, "no events in tests"))
    }

    async fn mount(&self, bus_path: &str) -> Result<String, StorageError> {
        self.record(format!("mount {bus_path}"));
        let gate = self.mount_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let info = self.get(bus_path)?;
        let name = if info.label.is_empty() { &info.uuid } else { &info.label };
        let target = format!("/media/test/{name}");
        self.table.mount(&info.device_path, &target, &info.id_type);
        Ok(target)
    }

    async fn unmount(&self, bus_path: &str, _force: bool) -> Result<(), StorageError> {
        self.record(format!("unmount {bus_path}"));
        let info = self.get(bus_path)?;
        self.table.unmount_source(&info.device_path);
        Ok(())
    }

    async fn unlock(&self, bus_path: &str, passphrase: &str) -> Result<String, StorageError> {
        self.record(format!("unlock {bus_path}"));
        if passphrase != PASSPHRASE {
            return Err(StorageError::new(
                StorageErrorKind::PermissionDenied,
                "wrong passphrase",
            ));
        }

        let mut volumes = self.volumes.lock().unwrap();
        let shell = volumes
            .get_mut(bus_path)
            .ok_or_else(|| StorageError::not_found(bus_path))?;
        shell.cleartext_bus_path = Some(CLEARTEXT_BUS_PATH.into());
        volumes.insert(
            CLEARTEXT_BUS_PATH.into(),
            BlockVolumeInfo {
                bus_path: CLEARTEXT_BUS_PATH.into(),
                device_path: "/dev/dm-0".into(),
                uuid: "CLEAR".into(),
                label: "Secret".into(),
                id_type: "ext4".into(),
                has_filesystem: true,
                crypto_backing_bus_path: Some(bus_path.into()),
                ..Default::default()
            },
        );
        Ok(CLEARTEXT_BUS_PATH.into())
    }

    async fn lock(&self, bus_path: &str) -> Result<(), StorageError> {
        self.record(format!("lock {bus_path}"));
        let mut volumes = self.volumes.lock().unwrap();
        if let Some(shell) = volumes.get_mut(bus_path) {
            shell.cleartext_bus_path = None;
        }
        volumes.remove(CLEARTEXT_BUS_PATH);
        Ok(())
    }

    async fn eject(&self, bus_path: &str) -> Result<(), StorageError> {
        self.record(format!("eject {bus_path}"));
        Ok(())
    }

    async fn power_off(&self, bus_path: &str) -> Result<(), StorageError> {
        self.record(format!("power_off {bus_path}"));
        Ok(())
    }

    async fn set_label(&self, bus_path: &str, label: &str) -> Result<(), StorageError> {
        self.record(format!("set_label {bus_path} {label}"));
        if let Some(info) = self.volumes.lock().unwrap().get_mut(bus_path) {
            info.label = label.into();
        }
        Ok(())
    }

    async fn format(&self, bus_path: &str, fs_type: &str, _label: &str) -> Result<(), StorageError> {
        self.record(format!("format {bus_path} {fs_type}"));
        if let Some(info) = self.volumes.lock().unwrap().get_mut(bus_path) {
            info.has_filesystem = true;
            info.id_type = fs_type.into();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    aliases: Mutex<Vec<AliasEntry>>,
    shares: Mutex<Vec<NetworkShareRegistration>>,
    apps: Mutex<Vec<AppEntryRegistration>>,
}

impl SettingsStore for MemorySettings {
    fn aliases(&self) -> Vec<AliasEntry> {
        self.aliases.lock().unwrap().clone()
    }

    fn set_aliases(&self, aliases: Vec<AliasEntry>) -> Result<(), StorageError> {
        *self.aliases.lock().unwrap() = aliases;
        Ok(())
    }

    fn network_shares(&self) -> Vec<NetworkShareRegistration> {
        self.shares.lock().unwrap().clone()
    }

    fn set_network_shares(&self, shares: Vec<NetworkShareRegistration>) -> Result<(), StorageError> {
        *self.shares.lock().unwrap() = shares;
        Ok(())
    }

    fn app_entries(&self) -> Vec<AppEntryRegistration> {
        self.apps.lock().unwrap().clone()
    }
}

/// Mounts shares under a fixed managed path, or refuses with `refusal`
pub struct FakeMounter {
    table: Arc<FakeTable>,
    pub refusal: Mutex<Option<i32>>,
    pub requests: Mutex<Vec<(String, MountOptions)>>,
}

impl FakeMounter {
    pub fn new(table: Arc<FakeTable>) -> Self {
        Self {
            table,
            refusal: Mutex::default(),
            requests: Mutex::default(),
        }
    }
}

fn cifs_source(uri: &str) -> String {
    format!("//{}", uri.trim_start_matches("smb://"))
}

#[async_trait]
impl NetworkMounter for FakeMounter {
    async fn mount(&self, source_uri: &str, options: &MountOptions) -> Result<MountResult, StorageError> {
        self.requests
            .lock()
            .unwrap()
            .push((source_uri.to_string(), options.clone()));
        if let Some(code) = *self.refusal.lock().unwrap() {
            return Ok(MountResult::failure(code, "refused"));
        }
        let target = "/media/test/smbmounts/share on 10.0.0.5";
        self.table.mount(&cifs_source(source_uri), target, "cifs");
        Ok(MountResult::success(target))
    }

    async fn unmount(&self, source_uri: &str, _options: &MountOptions) -> Result<UnmountResult, StorageError> {
        self.table.unmount_source(&cifs_source(source_uri));
        Ok(UnmountResult::success())
    }
}

pub struct ScriptedPrompts {
    pub confirm_format: bool,
    pub passphrase: String,
    pub format_asked: AtomicUsize,
    pub passphrase_asked: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
}

impl ScriptedPrompts {
    pub fn new(confirm_format: bool, passphrase: &str) -> Self {
        Self {
            confirm_format,
            passphrase: passphrase.into(),
            format_asked: AtomicUsize::new(0),
            passphrase_asked: AtomicUsize::new(0),
            errors: Mutex::default(),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptProvider for ScriptedPrompts {
    async fn confirm_format(&self, _device: &Device) -> bool {
        self.format_asked.fetch_add(1, Ordering::SeqCst);
        self.confirm_format
    }

    async fn ask_passphrase(&self, _device: &Device) -> String {
        self.passphrase_asked.fetch_add(1, Ordering::SeqCst);
        self.passphrase.clone()
    }

    async fn show_error(&self, title: &str, message: &str) {
        self.errors.lock().unwrap().push(format!("{title}: {message}"));
    }
}

pub fn usb_stick(bus_path: &str, uuid: &str, device_path: &str) -> BlockVolumeInfo {
    BlockVolumeInfo {
        bus_path: bus_path.into(),
        device_path: device_path.into(),
        uuid: uuid.into(),
        label: "USB".into(),
        id_type: "vfat".into(),
        size: 16_000_000_000,
        removable: true,
        ejectable: true,
        can_power_off: true,
        has_filesystem: true,
        ..Default::default()
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub table: Arc<FakeTable>,
    pub bus: Arc<FakeBus>,
    pub settings: Arc<MemorySettings>,
    pub mounter: Arc<FakeMounter>,
    pub prompts: Arc<ScriptedPrompts>,
    pub registry: Arc<DeviceRegistry>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub async fn new(volumes: Vec<BlockVolumeInfo>, prompts: ScriptedPrompts) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(FakeTable::default());
        let bus = Arc::new(FakeBus::new(table.clone(), volumes));
        let settings = Arc::new(MemorySettings::default());
        let mounter = Arc::new(FakeMounter::new(table.clone()));
        let prompts = Arc::new(prompts);

        let registry = Arc::new(DeviceRegistry::new(
            bus.clone(),
            table.clone(),
            settings.clone(),
            VaultLayout::new(dir.path()),
        ));
        registry.refresh().await;

        let orchestrator = Orchestrator::new(
            registry.clone(),
            bus.clone(),
            mounter.clone(),
            prompts.clone(),
        );

        Self {
            dir,
            table,
            bus,
            settings,
            mounter,
            prompts,
            registry,
            orchestrator,
        }
    }

    pub fn device(&self, id: &str) -> Device {
        self.registry.get_device(id).unwrap()
    }
}
