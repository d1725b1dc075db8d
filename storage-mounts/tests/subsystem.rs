// SPDX-License-Identifier: GPL-3.0-only

mod common;

use std::sync::Arc;

use common::{FakeBus, FakeMounter, FakeTable, MemorySettings, ScriptedPrompts, usb_stick};
use storage_mounts::registry::VAULT_ID;
use storage_mounts::{Config, Subsystem, VirtualUrl};

#[tokio::test]
async fn init_prepares_vault_and_catalog() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        data_dir: dir.path().join("data"),
        media_root: dir.path().join("media"),
        ..Config::default()
    };

    let table = Arc::new(FakeTable::default());
    let bus = Arc::new(FakeBus::new(
        table.clone(),
        vec![usb_stick("/b/sdb1", "AAAA", "/dev/sdb1")],
    ));
    table.mount(
        "//nas/share",
        &dir.path().join("media/alice/smbmounts/share on nas").to_string_lossy(),
        "cifs",
    );

    let mut subsystem = Subsystem::init(
        config,
        bus,
        table.clone(),
        Arc::new(MemorySettings::default()),
        Arc::new(FakeMounter::new(table.clone())),
        Arc::new(ScriptedPrompts::new(false, "")),
    )
    .await
    .expect("init");

    assert!(dir.path().join("data/vault_encrypted").is_dir());
    assert!(dir.path().join("data/vault_unlocked").is_dir());

    let ids: Vec<String> = subsystem
        .registry()
        .list_devices()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![VAULT_ID, "uuid:AAAA"]);

    std::fs::write(dir.path().join("data/vault_unlocked/note.txt"), b"hi").expect("write");
    let children = subsystem
        .dispatch()
        .children(&VirtualUrl::vault_root())
        .expect("vault listing");
    assert_eq!(children[0].url.to_string(), "vault://files/note.txt");

    let share = subsystem
        .registry()
        .register_share("smb://nas/share", None)
        .await
        .expect("register");
    assert!(subsystem.is_managed_mount(&share));
    assert!(!subsystem.is_managed_mount(&subsystem.registry().get_device("uuid:AAAA").expect("stick")));

    subsystem.shutdown();
}
