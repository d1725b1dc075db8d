// SPDX-License-Identifier: GPL-3.0-only

//! Device Registry & Watcher
//!
//! Keeps the raw bus observations and derives the device catalog from them
//! together with the mount table, the vault layout and the persisted
//! settings. Every rebuild diffs the new catalog against the previous one
//! and publishes typed [`RegistryEvent`]s.
//!
//! Reads (`list_devices`, `get_device`, ...) only take the catalog lock and
//! never wait on the bus. Mutations are serialized by an async update gate.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::StreamExt;
use storage_contracts::{
    BusEvent, BusEventStream, DeviceBus, MountTableSource, SettingsStore, StorageError,
    StorageErrorKind,
};
use storage_sys::{CifsShare, VaultLayout};
use storage_types::{
    AliasEntry, AppEntryRegistration, BlockVolumeInfo, Device, DeviceKind, MountState,
    MountTable, NetworkShareRegistration, VaultState, bytes_to_pretty,
};
use tokio::sync::{Mutex, broadcast};

pub const VAULT_ID: &str = "vault";
const VAULT_LABEL: &str = "Vault";
const EVENT_CAPACITY: usize = 256;

/// Catalog change notification; payloads are snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    DeviceAdded { device: Device },
    DeviceRemoved { id: String },
    DeviceChanged { device: Device },
    MountAdded { device: Device },
    MountRemoved { id: String },
}

#[derive(Debug, Default)]
struct Catalog {
    /// Last observation per bus object path
    volumes: BTreeMap<String, BlockVolumeInfo>,
    devices: HashMap<String, Device>,
    /// Transitional states set by the orchestrator, by device id
    transitions: HashMap<String, MountState>,
}

pub struct DeviceRegistry {
    bus: Arc<dyn DeviceBus>,
    mounts: Arc<dyn MountTableSource>,
    settings: Arc<dyn SettingsStore>,
    vault: VaultLayout,
    catalog: RwLock<Catalog>,
    update_gate: Mutex<()>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    pub fn new(
        bus: Arc<dyn DeviceBus>,
        mounts: Arc<dyn MountTableSource>,
        settings: Arc<dyn SettingsStore>,
        vault: VaultLayout,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bus,
            mounts,
            settings,
            vault,
            catalog: RwLock::default(),
            update_gate: Mutex::new(()),
            events,
        }
    }

    pub fn vault(&self) -> &VaultLayout {
        &self.vault
    }

    pub fn mount_table(&self) -> &dyn MountTableSource {
        self.mounts.as_ref()
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Snapshot ordered Vault, Block by device path, NetworkShare, AppEntry
    pub fn list_devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        devices
    }

    pub fn get_device(&self, id: &str) -> Option<Device> {
        self.read().devices.get(id).cloned()
    }

    /// Device whose mount point is the longest prefix of `path`
    pub fn get_device_by_mount_point(&self, path: impl AsRef<Path>) -> Option<Device> {
        let path = path.as_ref();
        self.read()
            .devices
            .values()
            .filter_map(|device| {
                let mount_point = device.mount_point.as_deref().map(Path::new)?;
                path.starts_with(mount_point)
                    .then(|| (mount_point.components().count(), device))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, device)| device.clone())
    }

    pub fn is_in_device_folder(&self, path: impl AsRef<Path>) -> bool {
        self.get_device_by_mount_point(path)
            .is_some_and(|device| matches!(device.kind, DeviceKind::Block | DeviceKind::NetworkShare))
    }

    pub fn is_in_removable_device_folder(&self, path: impl AsRef<Path>) -> bool {
        self.get_device_by_mount_point(path)
            .is_some_and(|device| device.kind == DeviceKind::Block && device.removable)
    }

    /// Full rescan of the bus followed by a rebuild.
    ///
    /// A failed enumeration keeps the last known volumes; the catalog is
    /// still reconciled against the mount table.
    pub async fn refresh(&self) {
        let _gate = self.update_gate.lock().await;

        match self.bus.enumerate().await {
            Ok(volumes) => {
                self.write().volumes = volumes
                    .into_iter()
                    .map(|info| (info.bus_path.clone(), info))
                    .collect();
            }
            Err(e) => tracing::warn!("device enumeration failed, keeping last known: {e}"),
        }

        self.rebuild_locked();
    }

    /// Re-resolve the object named by a bus event
    pub async fn apply_bus_event(&self, event: BusEvent) {
        let _gate = self.update_gate.lock().await;
        tracing::debug!("bus event {:?}", event);

        match &event {
            BusEvent::Removed(path) => {
                self.write().volumes.remove(path);
            }
            BusEvent::Added(path) | BusEvent::Changed(path) => match self.bus.volume(path).await {
                Ok(Some(info)) => {
                    self.write().volumes.insert(path.clone(), info);
                }
                Ok(None) => {
                    let known = self.write().volumes.remove(path).is_some();
                    // Drive objects change too; their volumes need a full pass.
                    if !known && matches!(event, BusEvent::Changed(_)) {
                        self.rescan_volumes_locked().await;
                    }
                }
                Err(e) => tracing::warn!("could not re-read {path}: {e}"),
            },
        }

        self.rebuild_locked();
    }

    /// Long-running watcher: applies bus events as they arrive and rescans
    /// on every `interval` tick to catch anything missed.
    pub async fn run(self: Arc<Self>, bus_events: Option<BusEventStream>, interval: Duration) {
        let mut bus_events = bus_events;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = next_event(&mut bus_events), if bus_events.is_some() => match event {
                    Some(event) => self.apply_bus_event(event).await,
                    None => {
                        tracing::warn!("device bus event stream ended, relying on periodic rescans");
                        bus_events = None;
                    }
                },
                _ = ticker.tick() => self.refresh().await,
            }
        }
    }

    /// Persist a network share and add it to the catalog
    pub async fn register_share(&self, uri: &str, label: Option<&str>) -> Result<Device, StorageError> {
        let share = CifsShare::parse(uri)
            .map_err(|e| StorageError::new(StorageErrorKind::InvalidInput, e.to_string()))?;
        let id = share_id(&share);

        let _gate = self.update_gate.lock().await;
        let mut shares = self.settings.network_shares();
        if !shares.iter().any(|s| s.id == id) {
            shares.push(NetworkShareRegistration {
                id: id.clone(),
                uri: uri.to_string(),
                label: label.map(str::to_string).unwrap_or_else(|| share.dir_name()),
            });
            self.settings.set_network_shares(shares)?;
            tracing::info!("registered network share {id}");
        }

        self.rebuild_locked();
        self.get_device(&id)
            .ok_or_else(|| StorageError::internal(format!("{id} missing after registration")))
    }

    /// Drop a persisted network share from settings and the catalog
    pub async fn forget_share(&self, id: &str) -> Result<(), StorageError> {
        let _gate = self.update_gate.lock().await;
        let mut shares = self.settings.network_shares();
        let before = shares.len();
        shares.retain(|s| s.id != id);
        if shares.len() == before {
            return Err(StorageError::not_found(format!("no network share {id}")));
        }
        self.settings.set_network_shares(shares)?;
        tracing::info!("forgot network share {id}");

        self.rebuild_locked();
        Ok(())
    }

    /// Rebuild after a settings change made elsewhere (e.g. aliases)
    pub async fn reload(&self) {
        let _gate = self.update_gate.lock().await;
        self.rebuild_locked();
    }

    /// Show `state` for `id` until [`Self::settle`] is called
    pub fn begin_transition(&self, id: &str, state: MountState) {
        let changed = {
            let mut catalog = self.write();
            catalog.transitions.insert(id.to_string(), state);
            catalog.devices.get_mut(id).map(|device| {
                apply_transition(device, state);
                device.clone()
            })
        };
        if let Some(device) = changed {
            self.publish(vec![RegistryEvent::DeviceChanged { device }]);
        }
    }

    /// Clear the transitional state and let the mount table decide again
    pub async fn settle(&self, id: &str) {
        let _gate = self.update_gate.lock().await;
        self.write().transitions.remove(id);
        self.rebuild_locked();
    }

    async fn rescan_volumes_locked(&self) {
        match self.bus.enumerate().await {
            Ok(volumes) => {
                self.write().volumes = volumes
                    .into_iter()
                    .map(|info| (info.bus_path.clone(), info))
                    .collect();
            }
            Err(e) => tracing::warn!("device enumeration failed: {e}"),
        }
    }

    /// Derive the catalog from current observations and publish the diff.
    /// Callers hold the update gate.
    fn rebuild_locked(&self) {
        let table = match self.mounts.snapshot() {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("mount table unavailable, keeping last known catalog: {e}");
                return;
            }
        };
        let vault_state = self.vault.state(self.mounts.as_ref());

        let sources = CatalogSources {
            table: &table,
            vault: &self.vault,
            vault_state,
            aliases: self.settings.aliases(),
            shares: self.settings.network_shares(),
            apps: self.settings.app_entries(),
        };

        let events = {
            let mut catalog = self.write();
            let devices = build_devices(&catalog.volumes, &sources, &catalog.transitions);
            let events = diff_catalog(&catalog.devices, &devices);
            catalog.devices = devices;
            events
        };
        self.publish(events);
    }

    fn publish(&self, events: Vec<RegistryEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn next_event(stream: &mut Option<BusEventStream>) -> Option<BusEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => None,
    }
}

fn sort_key(device: &Device) -> (DeviceKind, String) {
    let secondary = match device.kind {
        DeviceKind::Block => device.device_path.clone().unwrap_or_else(|| device.id.clone()),
        _ => device.id.clone(),
    };
    (device.kind, secondary)
}

/// `smb:<host>/<share>`
pub fn share_id(share: &CifsShare) -> String {
    format!("smb:{}/{}", share.host, share.share)
}

struct CatalogSources<'a> {
    table: &'a MountTable,
    vault: &'a VaultLayout,
    vault_state: VaultState,
    aliases: Vec<AliasEntry>,
    shares: Vec<NetworkShareRegistration>,
    apps: Vec<AppEntryRegistration>,
}

fn build_devices(
    volumes: &BTreeMap<String, BlockVolumeInfo>,
    sources: &CatalogSources<'_>,
    transitions: &HashMap<String, MountState>,
) -> HashMap<String, Device> {
    let mut devices = HashMap::new();

    let vault = vault_device(sources.vault, sources.vault_state);
    devices.insert(vault.id.clone(), vault);

    let ids = block_ids(volumes);

    for info in volumes.values() {
        let device = block_device(info, &ids[info.bus_path.as_str()], &ids, sources);
        devices.insert(device.id.clone(), device);
    }

    for share in &sources.shares {
        let device = share_device(share, sources.table);
        devices.insert(device.id.clone(), device);
    }

    for app in &sources.apps {
        let mut device = Device::new(&app.id, DeviceKind::AppEntry, &app.name);
        device.command = Some(app.command.clone());
        devices.insert(device.id.clone(), device);
    }

    for (id, state) in transitions {
        if let Some(device) = devices.get_mut(id) {
            apply_transition(device, *state);
        }
    }

    devices
}

fn apply_transition(device: &mut Device, state: MountState) {
    device.mount_state = state;
    if state != MountState::Mounted {
        device.mount_point = None;
    }
}

fn vault_device(vault: &VaultLayout, state: VaultState) -> Device {
    let mut device = Device::new(VAULT_ID, DeviceKind::Vault, VAULT_LABEL);
    device.encrypted = true;
    device.has_filesystem = state != VaultState::NotExisted;
    device.fs_type = storage_sys::vault::VAULT_FS_TYPE.to_string();
    let mount_point = state
        .is_unlocked()
        .then(|| vault.unlocked_dir().to_string_lossy().into_owned());
    device.set_mounted_at(mount_point);
    device
}

/// Device id per bus path.
///
/// Volumes may share a content UUID (RAID and btrfs members, cloned
/// partitions). The first one by bus path keeps the plain id, the others get
/// it suffixed with their drive serial and partition, or their bus path.
fn block_ids(volumes: &BTreeMap<String, BlockVolumeInfo>) -> HashMap<&str, String> {
    let mut taken = HashSet::new();
    let mut ids = HashMap::new();

    for info in volumes.values() {
        let base = info.stable_id();
        let id = if !taken.contains(&base) {
            base
        } else {
            let by_drive = format!("{base}@{}:{}", info.drive_serial, info.partition_number);
            if info.drive_serial.is_empty() || taken.contains(&by_drive) {
                format!("{base}@{}", info.bus_path)
            } else {
                by_drive
            }
        };
        taken.insert(id.clone());
        ids.insert(info.bus_path.as_str(), id);
    }

    ids
}

fn block_device(
    info: &BlockVolumeInfo,
    id: &str,
    ids: &HashMap<&str, String>,
    sources: &CatalogSources<'_>,
) -> Device {
    let label = if info.label.is_empty() {
        format!("{} Volume", bytes_to_pretty(&info.size, false))
    } else {
        info.label.clone()
    };

    let mut device = Device::new(id, DeviceKind::Block, label);
    device.encrypted = info.encrypted;
    device.has_filesystem = info.has_filesystem;
    device.removable = info.removable;
    device.ejectable = info.ejectable;
    device.can_power_off = info.can_power_off;
    device.uuid = info.uuid.clone();
    device.fs_type = info.id_type.clone();
    device.size = info.size;
    device.device_path = Some(info.device_path.clone()).filter(|p| !p.is_empty());
    device.bus_path = Some(info.bus_path.clone());
    device.cleartext_peer_id = peer_id(info.cleartext_bus_path.as_deref(), ids);
    device.crypto_backing_id = peer_id(info.crypto_backing_bus_path.as_deref(), ids);

    if let Some(alias) = sources
        .aliases
        .iter()
        .find(|a| !info.uuid.is_empty() && a.uuid == info.uuid)
    {
        device.display_name = alias.alias.clone();
    }

    device.set_mounted_at(block_mount_point(info, sources.table));
    device
}

/// The mount table decides; bus-reported mount points only help to match
/// device nodes the table lists under another name.
fn block_mount_point(info: &BlockVolumeInfo, table: &MountTable) -> Option<String> {
    if !info.has_filesystem {
        return None;
    }
    if !info.device_path.is_empty()
        && let Some(entry) = table.find_source(&info.device_path)
    {
        return Some(entry.target.clone());
    }
    info.mount_points
        .iter()
        .find_map(|mp| table.find_target(mp).map(|entry| entry.target.clone()))
}

fn peer_id(bus_path: Option<&str>, ids: &HashMap<&str, String>) -> Option<String> {
    let bus_path = bus_path?;
    Some(ids.get(bus_path).cloned().unwrap_or_else(|| bus_path.to_string()))
}

fn share_device(share: &NetworkShareRegistration, table: &MountTable) -> Device {
    let mut device = Device::new(&share.id, DeviceKind::NetworkShare, &share.label);
    device.source = Some(share.uri.clone());
    device.fs_type = "cifs".to_string();

    let mount_point = CifsShare::parse(&share.uri)
        .ok()
        .and_then(|cifs| table.find_source(&cifs.source()).map(|e| e.target.clone()));
    device.set_mounted_at(mount_point);
    device
}

/// Events turning `old` into `new`, in a stable order
fn diff_catalog(old: &HashMap<String, Device>, new: &HashMap<String, Device>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();

    let mut removed: Vec<&Device> = old.values().filter(|d| !new.contains_key(&d.id)).collect();
    removed.sort_by(|a, b| a.id.cmp(&b.id));
    for device in removed {
        if device.is_mounted() {
            events.push(RegistryEvent::MountRemoved { id: device.id.clone() });
        }
        events.push(RegistryEvent::DeviceRemoved { id: device.id.clone() });
    }

    let mut current: Vec<&Device> = new.values().collect();
    current.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    for device in current {
        match old.get(&device.id) {
            None => {
                events.push(RegistryEvent::DeviceAdded { device: device.clone() });
                if device.is_mounted() {
                    events.push(RegistryEvent::MountAdded { device: device.clone() });
                }
            }
            Some(previous) if previous != device => {
                match (previous.is_mounted(), device.is_mounted()) {
                    (false, true) => events.push(RegistryEvent::MountAdded { device: device.clone() }),
                    (true, false) => events.push(RegistryEvent::MountRemoved { id: device.id.clone() }),
                    _ => {}
                }
                events.push(RegistryEvent::DeviceChanged { device: device.clone() });
            }
            Some(_) => {}
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_types::MountEntry;

    fn usb(bus: &str, uuid: &str, dev: &str) -> BlockVolumeInfo {
        BlockVolumeInfo {
            bus_path: bus.into(),
            device_path: dev.into(),
            uuid: uuid.into(),
            label: "USB".into(),
            id_type: "vfat".into(),
            size: 16_000_000_000,
            removable: true,
            has_filesystem: true,
            ..Default::default()
        }
    }

    fn sources<'a>(table: &'a MountTable, vault: &'a VaultLayout) -> CatalogSources<'a> {
        CatalogSources {
            table,
            vault,
            vault_state: VaultState::NotExisted,
            aliases: vec![],
            shares: vec![],
            apps: vec![],
        }
    }

    #[test]
    fn mount_state_comes_from_the_table() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::new(vec![MountEntry {
            source: "/dev/sdb1".into(),
            target: "/media/alice/USB".into(),
            fs_type: "vfat".into(),
            options: vec![],
        }]);
        let mut volumes = BTreeMap::new();
        let mut info = usb("/b/sdb1", "AAAA", "/dev/sdb1");
        // Stale bus view must not win over the table.
        info.mount_points = vec!["/somewhere/else".into()];
        volumes.insert(info.bus_path.clone(), info);

        let devices = build_devices(&volumes, &sources(&table, &vault), &HashMap::new());
        let device = &devices["uuid:AAAA"];
        assert!(device.is_mounted());
        assert_eq!(device.mount_point.as_deref(), Some("/media/alice/USB"));

        let empty = MountTable::default();
        let devices = build_devices(&volumes, &sources(&empty, &vault), &HashMap::new());
        assert_eq!(devices["uuid:AAAA"].mount_state, MountState::Unmounted);
    }

    #[test]
    fn crypto_peers_are_linked_by_id() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::default();
        let shell = BlockVolumeInfo {
            bus_path: "/b/sdc1".into(),
            uuid: "SHELL".into(),
            encrypted: true,
            cleartext_bus_path: Some("/b/dm_0".into()),
            ..Default::default()
        };
        let clear = BlockVolumeInfo {
            bus_path: "/b/dm_0".into(),
            uuid: "CLEAR".into(),
            has_filesystem: true,
            crypto_backing_bus_path: Some("/b/sdc1".into()),
            ..Default::default()
        };
        let volumes = BTreeMap::from([
            (shell.bus_path.clone(), shell),
            (clear.bus_path.clone(), clear),
        ]);

        let devices = build_devices(&volumes, &sources(&table, &vault), &HashMap::new());
        assert_eq!(devices["uuid:SHELL"].cleartext_peer_id.as_deref(), Some("uuid:CLEAR"));
        assert!(!devices["uuid:SHELL"].is_locked());
        assert_eq!(devices["uuid:CLEAR"].crypto_backing_id.as_deref(), Some("uuid:SHELL"));
    }

    #[test]
    fn aliases_shares_and_apps_join_the_catalog() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::new(vec![MountEntry {
            source: "//10.0.0.5/share".into(),
            target: "/media/alice/smbmounts/share on 10.0.0.5".into(),
            fs_type: "cifs".into(),
            options: vec![],
        }]);
        let mut src = sources(&table, &vault);
        src.aliases = vec![AliasEntry {
            uuid: "AAAA".into(),
            display_name: "USB".into(),
            alias: "Backup".into(),
        }];
        src.shares = vec![NetworkShareRegistration {
            id: "smb:10.0.0.5/share".into(),
            uri: "smb://10.0.0.5/share".into(),
            label: "share".into(),
        }];
        src.apps = vec![AppEntryRegistration {
            id: "app:term".into(),
            name: "Terminal".into(),
            command: "cosmic-term".into(),
        }];
        let info = usb("/b/sdb1", "AAAA", "/dev/sdb1");
        let volumes = BTreeMap::from([(info.bus_path.clone(), info)]);

        let devices = build_devices(&volumes, &src, &HashMap::new());
        assert_eq!(devices["uuid:AAAA"].display_name, "Backup");
        assert_eq!(devices["uuid:AAAA"].label, "USB");
        assert!(devices["smb:10.0.0.5/share"].is_mounted());
        assert_eq!(devices["app:term"].command.as_deref(), Some("cosmic-term"));
        assert_eq!(devices[VAULT_ID].kind, DeviceKind::Vault);
    }

    #[test]
    fn transitions_override_observed_state() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::default();
        let info = usb("/b/sdb1", "AAAA", "/dev/sdb1");
        let volumes = BTreeMap::from([(info.bus_path.clone(), info)]);
        let transitions = HashMap::from([("uuid:AAAA".to_string(), MountState::Mounting)]);

        let devices = build_devices(&volumes, &sources(&table, &vault), &transitions);
        assert_eq!(devices["uuid:AAAA"].mount_state, MountState::Mounting);
        assert_eq!(devices["uuid:AAAA"].mount_point, None);
    }

    #[test]
    fn diff_reports_mount_changes_and_removals() {
        let mut before = Device::new("uuid:1", DeviceKind::Block, "USB");
        before.set_mounted_at(Some("/media/a/USB".into()));
        let gone = Device::new("uuid:2", DeviceKind::Block, "Old");
        let old = HashMap::from([
            (before.id.clone(), before.clone()),
            (gone.id.clone(), gone.clone()),
        ]);

        let mut after = before.clone();
        after.set_mounted_at(None);
        let fresh = Device::new("uuid:3", DeviceKind::Block, "New");
        let new = HashMap::from([(after.id.clone(), after.clone()), (fresh.id.clone(), fresh.clone())]);

        let events = diff_catalog(&old, &new);
        assert_eq!(
            events,
            vec![
                RegistryEvent::DeviceRemoved { id: "uuid:2".into() },
                RegistryEvent::MountRemoved { id: "uuid:1".into() },
                RegistryEvent::DeviceChanged { device: after },
                RegistryEvent::DeviceAdded { device: fresh },
            ]
        );
    }

    #[test]
    fn unlabeled_volumes_are_named_by_size() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::default();
        let mut info = usb("/b/sdb1", "AAAA", "/dev/sdb1");
        info.label.clear();
        info.size = 16 * 1024 * 1024 * 1024;
        let volumes = BTreeMap::from([(info.bus_path.clone(), info)]);

        let devices = build_devices(&volumes, &sources(&table, &vault), &HashMap::new());
        assert_eq!(devices["uuid:AAAA"].label, "16.00 GB Volume");
    }

    #[test]
    fn volumes_sharing_a_uuid_stay_distinct() {
        let vault = VaultLayout::new("/tmp/none");
        let table = MountTable::new(vec![MountEntry {
            source: "/dev/sdc1".into(),
            target: "/media/alice/CLONE".into(),
            fs_type: "vfat".into(),
            options: vec![],
        }]);
        let first = usb("/b/sdb1", "SAME", "/dev/sdb1");
        let mut second = usb("/b/sdc1", "SAME", "/dev/sdc1");
        second.drive_serial = "SN02".into();
        second.partition_number = 1;
        let mut third = usb("/b/sdd1", "SAME", "/dev/sdd1");
        third.drive_serial.clear();
        let volumes = BTreeMap::from([
            (first.bus_path.clone(), first),
            (second.bus_path.clone(), second),
            (third.bus_path.clone(), third),
        ]);

        let devices = build_devices(&volumes, &sources(&table, &vault), &HashMap::new());
        let blocks: Vec<&Device> = devices
            .values()
            .filter(|d| d.kind == DeviceKind::Block)
            .collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(devices["uuid:SAME"].device_path.as_deref(), Some("/dev/sdb1"));
        let clone = &devices["uuid:SAME@SN02:1"];
        assert_eq!(clone.device_path.as_deref(), Some("/dev/sdc1"));
        assert_eq!(clone.mount_point.as_deref(), Some("/media/alice/CLONE"));
        assert_eq!(devices["uuid:SAME@/b/sdd1"].device_path.as_deref(), Some("/dev/sdd1"));
    }
}
