// SPDX-License-Identifier: GPL-3.0-only

//! CIFS mount/unmount on behalf of an unprivileged caller.
//!
//! Mounts only ever land below the managed root and carry the caller's
//! `uid=`, which is how ownership is recognised afterwards.

use std::path::Path;
use std::sync::Arc;

use storage_contracts::{MountError, MountErrorKind, MountTableSource};
use storage_sys::{
    CifsShare, MountPathReservation, MountRoot, MountSyscalls, SysError, build_cifs_options,
    mask_password,
};
use storage_types::{CallerInfo, MountEntry, MountOptions, MountResult, MountTable, UnmountResult};

use crate::auth::{Authorizer, MOUNT_ACTION, UNMOUNT_OTHER_ACTION};

const SMB_SCHEME: &str = "smb://";
const CIFS_FS_TYPE: &str = "cifs";

/// Where a source currently stands with respect to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
enum MountStatus {
    NotMounted,
    /// Mounted below the managed root, cifs, owned by the caller
    Owned(String),
    Foreign(MountErrorKind, String),
}

pub struct CifsMountExecutor {
    root: MountRoot,
    mounts: Arc<dyn MountTableSource>,
    syscalls: Arc<dyn MountSyscalls>,
    authorizer: Arc<dyn Authorizer>,
}

impl CifsMountExecutor {
    pub fn new(
        root: MountRoot,
        mounts: Arc<dyn MountTableSource>,
        syscalls: Arc<dyn MountSyscalls>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            root,
            mounts,
            syscalls,
            authorizer,
        }
    }

    pub async fn mount(
        &self,
        caller: &CallerInfo,
        source_uri: &str,
        opts: &MountOptions,
    ) -> MountResult {
        match self.try_mount(caller, source_uri, opts).await {
            Ok(mount_point) => MountResult::success(mount_point),
            Err(e) => {
                tracing::warn!("mount {} for uid {} failed: {}", source_uri, caller.uid, e);
                e.into()
            }
        }
    }

    pub async fn unmount(
        &self,
        caller: &CallerInfo,
        source_uri: &str,
        _opts: &MountOptions,
    ) -> UnmountResult {
        match self.try_unmount(caller, source_uri).await {
            Ok(()) => UnmountResult::success(),
            Err(e) => {
                tracing::warn!("unmount {} for uid {} failed: {}", source_uri, caller.uid, e);
                e.into()
            }
        }
    }

    /// Reserve a fresh mount-point name for `source_uri` under `username`
    pub fn generate_mount_path(
        &self,
        username: &str,
        source_uri: &str,
    ) -> Result<MountPathReservation, MountError> {
        let share = parse_share(source_uri)?;
        self.root
            .generate_mount_path(username, &share, &self.snapshot()?)
            .map_err(|e| MountError::service(MountErrorKind::CannotGenerateMountPath, e.to_string()))
    }

    async fn try_mount(
        &self,
        caller: &CallerInfo,
        source_uri: &str,
        opts: &MountOptions,
    ) -> Result<String, MountError> {
        let share = parse_share(source_uri)?;
        self.require(caller, MOUNT_ACTION).await?;

        let source = share.source();
        let table = self.snapshot()?;
        match self.check_mount(&table, &source, caller) {
            MountStatus::Owned(target) => {
                tracing::info!("{} already mounted at {}", source, target);
                return Ok(target);
            }
            MountStatus::Foreign(kind, message) => {
                return Err(MountError::service(kind, message));
            }
            MountStatus::NotMounted => {}
        }

        let username = caller.username.as_deref().ok_or_else(|| {
            MountError::service(
                MountErrorKind::CannotGenerateMountPath,
                format!("no user name for uid {}", caller.uid),
            )
        })?;

        let reservation = self
            .root
            .create_mount_point(username, &share, &table)
            .map_err(|e| match e {
                SysError::Io(_) => MountError::service(
                    MountErrorKind::CannotMkdirMountPoint,
                    format!("cannot create mount point: {e}"),
                ),
                _ => MountError::service(
                    MountErrorKind::CannotGenerateMountPath,
                    format!("cannot generate mount point: {e}"),
                ),
            })?;
        let target = reservation.path().to_string_lossy().into_owned();

        let mut params = opts.clone();
        loop {
            let options = build_cifs_options(&params, caller.uid, caller.gid, share.is_localhost());
            tracing::info!("mounting {} on {} with {}", source, target, mask_password(&options));

            match self.run_mount(&source, &target, options).await {
                Ok(()) => {
                    tracing::info!("mounted {} on {}", source, target);
                    return Ok(target);
                }
                Err(e) if params.timeout_seconds.is_some() => {
                    tracing::warn!("mount {} failed with timeout set ({}), retrying without", source, e);
                    params.timeout_seconds = None;
                }
                Err(e) => {
                    self.root.remove_mount_point(reservation.path());
                    return Err(e);
                }
            }
        }
    }

    async fn try_unmount(&self, caller: &CallerInfo, source_uri: &str) -> Result<(), MountError> {
        let share = parse_share(source_uri)?;
        let source = share.source();
        let table = self.snapshot()?;

        let target = match self.check_mount(&table, &source, caller) {
            MountStatus::NotMounted => {
                return Err(MountError::service(
                    MountErrorKind::NotExist,
                    format!("{source_uri} is not mounted"),
                ));
            }
            MountStatus::Owned(target) => target,
            MountStatus::Foreign(MountErrorKind::NotOwner, target) => {
                if !self.authorized(caller, UNMOUNT_OTHER_ACTION).await {
                    return Err(MountError::service(
                        MountErrorKind::NotOwnerOfMount,
                        "invoker is not the owner of mount",
                    ));
                }
                target
            }
            MountStatus::Foreign(kind, message) => return Err(MountError::service(kind, message)),
        };

        let syscalls = Arc::clone(&self.syscalls);
        let umount_target = target.clone();
        tokio::task::spawn_blocking(move || syscalls.umount(&umount_target))
            .await
            .map_err(|e| MountError::Syscall {
                errno: libc::EIO,
                message: e.to_string(),
            })??;

        tracing::info!("unmounted {} from {}", source, target);
        self.root.remove_mount_point(Path::new(&target));
        Ok(())
    }

    fn check_mount(&self, table: &MountTable, source: &str, caller: &CallerInfo) -> MountStatus {
        let Some(entry) = table.find(source) else {
            return MountStatus::NotMounted;
        };
        classify_entry(&self.root, entry, caller.uid)
    }

    async fn run_mount(&self, source: &str, target: &str, options: String) -> Result<(), MountError> {
        let syscalls = Arc::clone(&self.syscalls);
        let source = source.to_string();
        let target = target.to_string();
        tokio::task::spawn_blocking(move || syscalls.mount(&source, &target, &options))
            .await
            .map_err(|e| MountError::Syscall {
                errno: libc::EIO,
                message: e.to_string(),
            })?
    }

    async fn require(&self, caller: &CallerInfo, action_id: &str) -> Result<(), MountError> {
        if self.authorized(caller, action_id).await {
            Ok(())
        } else {
            Err(MountError::service(
                MountErrorKind::NotOwnerOfMount,
                format!("not authorized for {action_id}"),
            ))
        }
    }

    async fn authorized(&self, caller: &CallerInfo, action_id: &str) -> bool {
        match self.authorizer.check(caller, action_id).await {
            Ok(authorized) => authorized,
            Err(e) => {
                tracing::warn!("authorization check for {} failed: {}", action_id, e);
                false
            }
        }
    }

    /// Current mount table. Deciding on a guessed table could mount a share
    /// twice or report a live mount as missing, so an unreadable one fails.
    fn snapshot(&self) -> Result<MountTable, MountError> {
        self.mounts.snapshot().map_err(|e| {
            tracing::warn!("mount table unavailable: {}", e);
            MountError::Syscall {
                errno: libc::EIO,
                message: format!("cannot read mount table: {}", e.message),
            }
        })
    }
}

fn parse_share(source_uri: &str) -> Result<CifsShare, MountError> {
    if !source_uri.starts_with(SMB_SCHEME) {
        return Err(MountError::service(
            MountErrorKind::NotSupportedScheme,
            format!("unsupported scheme: {source_uri}"),
        ));
    }
    CifsShare::parse(source_uri).map_err(|e| {
        MountError::service(MountErrorKind::CannotGenerateMountPath, e.to_string())
    })
}

/// Decide ownership of an existing mount. For `NotOwner` the message slot
/// carries the target so an authorized unmount can proceed.
fn classify_entry(root: &MountRoot, entry: &MountEntry, uid: u32) -> MountStatus {
    if !root.is_managed(&entry.target) {
        return MountStatus::Foreign(
            MountErrorKind::NotMountByDaemon,
            format!("{} is not mounted by the service", entry.target),
        );
    }
    if entry.fs_type != CIFS_FS_TYPE {
        return MountStatus::Foreign(
            MountErrorKind::NotCifs,
            format!("{} is not a cifs mount", entry.target),
        );
    }
    match entry.option_value("uid") {
        Some(owner) if owner == uid.to_string() => MountStatus::Owned(entry.target.clone()),
        _ => MountStatus::Foreign(MountErrorKind::NotOwner, entry.target.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as ServiceResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storage_contracts::StorageError;
    use storage_sys::mount_root::DEFAULT_NAMESPACE;

    #[derive(Default)]
    struct FakeTable(Mutex<Vec<MountEntry>>);

    impl FakeTable {
        fn push(&self, entry: MountEntry) {
            self.0.lock().expect("lock").push(entry);
        }
    }

    impl MountTableSource for FakeTable {
        fn snapshot(&self) -> std::result::Result<MountTable, StorageError> {
            Ok(MountTable::new(self.0.lock().expect("lock").clone()))
        }
    }

    /// Records every call; fails mounts whose options match `fail_when`
    #[derive(Default)]
    struct FakeSyscalls {
        mounts: Mutex<Vec<(String, String, String)>>,
        umounts: Mutex<Vec<String>>,
        fail_when: Option<fn(&str) -> bool>,
    }

    impl MountSyscalls for FakeSyscalls {
        fn mount(&self, source: &str, target: &str, options: &str) -> std::result::Result<(), MountError> {
            self.mounts
                .lock()
                .expect("lock")
                .push((source.into(), target.into(), options.into()));
            match self.fail_when {
                Some(fail) if fail(options) => Err(MountError::Syscall {
                    errno: libc::EHOSTDOWN,
                    message: "Host is down".into(),
                }),
                _ => Ok(()),
            }
        }

        fn umount(&self, target: &str) -> std::result::Result<(), MountError> {
            self.umounts.lock().expect("lock").push(target.into());
            Ok(())
        }
    }

    struct UnreadableTable;

    impl MountTableSource for UnreadableTable {
        fn snapshot(&self) -> std::result::Result<MountTable, StorageError> {
            Err(StorageError::internal("mountinfo: permission denied"))
        }
    }

    struct FixedAuthorizer(bool);

    #[async_trait]
    impl Authorizer for FixedAuthorizer {
        async fn check(&self, _caller: &CallerInfo, _action_id: &str) -> ServiceResult<bool> {
            Ok(self.0)
        }
    }

    struct Fixture {
        media: tempfile::TempDir,
        table: Arc<FakeTable>,
        syscalls: Arc<FakeSyscalls>,
        executor: CifsMountExecutor,
    }

    fn fixture(syscalls: FakeSyscalls, authorized: bool) -> Fixture {
        let media = tempfile::tempdir().expect("tempdir");
        let table = Arc::new(FakeTable::default());
        let syscalls = Arc::new(syscalls);
        let executor = CifsMountExecutor::new(
            MountRoot::new(media.path(), DEFAULT_NAMESPACE),
            table.clone(),
            syscalls.clone(),
            Arc::new(FixedAuthorizer(authorized)),
        );
        Fixture {
            media,
            table,
            syscalls,
            executor,
        }
    }

    fn alice() -> CallerInfo {
        CallerInfo::new(1000, 1000, Some("alice".into()), ":1.42")
    }

    fn cifs_entry(target: String, uid: u32) -> MountEntry {
        MountEntry {
            source: "//10.0.0.5/share".into(),
            target,
            fs_type: "cifs".into(),
            options: vec!["rw".into(), format!("uid={uid}"), "gid=1000".into()],
        }
    }

    #[tokio::test]
    async fn mounts_with_credentials_and_owner_ids() {
        let fx = fixture(FakeSyscalls::default(), true);
        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::with_credentials("a", "b"))
            .await;

        let expected = fx.media.path().join("alice/smbmounts/share on 10.0.0.5");
        assert!(result.result, "{result:?}");
        assert_eq!(result.error_code, 0);
        assert_eq!(result.mount_point, expected.to_string_lossy());
        assert!(expected.is_dir());

        let mounts = fx.syscalls.mounts.lock().expect("lock");
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].0, "//10.0.0.5/share");
        assert!(mounts[0].2.starts_with("user=a,pass=b,"));
        assert!(mounts[0].2.contains("uid=1000,gid=1000"));
    }

    #[tokio::test]
    async fn already_mounted_share_short_circuits() {
        let fx = fixture(FakeSyscalls::default(), true);
        let target = fx.media.path().join("alice/smbmounts/share on 10.0.0.5");
        fx.table.push(cifs_entry(target.to_string_lossy().into_owned(), 1000));

        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;

        assert!(result.result);
        assert_eq!(result.error_code, 0);
        assert_eq!(result.mount_point, target.to_string_lossy());
        assert!(fx.syscalls.mounts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn foreign_mounts_are_reported() {
        let fx = fixture(FakeSyscalls::default(), true);
        fx.table.push(MountEntry {
            source: "//10.0.0.5/share".into(),
            target: "/mnt/share".into(),
            fs_type: "cifs".into(),
            options: vec![],
        });
        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert_eq!(result.error_code, MountErrorKind::NotMountByDaemon.wire_code());

        let fx = fixture(FakeSyscalls::default(), true);
        let target = fx.media.path().join("alice/smbmounts/share on 10.0.0.5");
        fx.table.push(cifs_entry(target.to_string_lossy().into_owned(), 1001));
        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert_eq!(result.error_code, MountErrorKind::NotOwner.wire_code());
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let fx = fixture(FakeSyscalls::default(), true);
        let result = fx
            .executor
            .mount(&alice(), "ftp://10.0.0.5/share", &MountOptions::default())
            .await;
        assert!(!result.result);
        assert_eq!(result.error_code, MountErrorKind::NotSupportedScheme.wire_code());
    }

    #[tokio::test]
    async fn denied_mount_authorization_touches_nothing() {
        let fx = fixture(FakeSyscalls::default(), false);
        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert_eq!(result.error_code, MountErrorKind::NotOwnerOfMount.wire_code());
        assert!(fx.syscalls.mounts.lock().expect("lock").is_empty());
        assert!(!fx.media.path().join("alice").exists());
    }

    #[tokio::test]
    async fn timeout_failure_retries_once_without_timeout() {
        let syscalls = FakeSyscalls {
            fail_when: Some(|opts| opts.contains("wait_reconnect_timeout")),
            ..Default::default()
        };
        let fx = fixture(syscalls, true);
        let opts = MountOptions {
            timeout_seconds: Some(5),
            ..MountOptions::with_credentials("a", "b")
        };

        let result = fx.executor.mount(&alice(), "smb://10.0.0.5/share", &opts).await;

        assert!(result.result, "{result:?}");
        let mounts = fx.syscalls.mounts.lock().expect("lock");
        assert_eq!(mounts.len(), 2);
        assert!(mounts[0].2.contains("wait_reconnect_timeout=5"));
        assert!(!mounts[1].2.contains("wait_reconnect_timeout"));
        assert_eq!(mounts[0].1, mounts[1].1);
    }

    #[tokio::test]
    async fn hard_failure_removes_directory_and_keeps_errno() {
        let syscalls = FakeSyscalls {
            fail_when: Some(|_| true),
            ..Default::default()
        };
        let fx = fixture(syscalls, true);

        let result = fx
            .executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;

        assert!(!result.result);
        assert_eq!(result.error_code, libc::EHOSTDOWN);
        assert!(!fx.media.path().join("alice/smbmounts/share on 10.0.0.5").exists());
        assert_eq!(fx.syscalls.mounts.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unmount_of_unknown_source_is_not_exist() {
        let fx = fixture(FakeSyscalls::default(), true);
        let result = fx
            .executor
            .unmount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert_eq!(result.error_code, MountErrorKind::NotExist.wire_code());
    }

    #[tokio::test]
    async fn unmount_by_denied_non_owner_makes_no_syscall() {
        let fx = fixture(FakeSyscalls::default(), false);
        let target = fx.media.path().join("bob/smbmounts/share on 10.0.0.5");
        fx.table.push(cifs_entry(target.to_string_lossy().into_owned(), 1001));

        let result = fx
            .executor
            .unmount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;

        assert!(!result.result);
        assert_eq!(result.error_code, MountErrorKind::NotOwnerOfMount.wire_code());
        assert!(fx.syscalls.umounts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn owner_unmount_removes_mount_point() {
        let fx = fixture(FakeSyscalls::default(), false);
        let target = fx.media.path().join("alice/smbmounts/share on 10.0.0.5");
        std::fs::create_dir_all(&target).expect("mount point");
        fx.table.push(cifs_entry(target.to_string_lossy().into_owned(), 1000));

        let result = fx
            .executor
            .unmount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;

        assert!(result.result, "{result:?}");
        assert_eq!(fx.syscalls.umounts.lock().expect("lock").len(), 1);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn unreadable_mount_table_fails_without_side_effects() {
        let media = tempfile::tempdir().expect("tempdir");
        let syscalls = Arc::new(FakeSyscalls::default());
        let executor = CifsMountExecutor::new(
            MountRoot::new(media.path(), DEFAULT_NAMESPACE),
            Arc::new(UnreadableTable),
            syscalls.clone(),
            Arc::new(FixedAuthorizer(true)),
        );

        let mounted = executor
            .mount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert!(!mounted.result);
        assert_eq!(mounted.error_code, libc::EIO);

        let unmounted = executor
            .unmount(&alice(), "smb://10.0.0.5/share", &MountOptions::default())
            .await;
        assert!(!unmounted.result);
        assert_eq!(unmounted.error_code, libc::EIO);

        assert!(executor.generate_mount_path("alice", "smb://10.0.0.5/share").is_err());
        assert!(syscalls.mounts.lock().expect("lock").is_empty());
        assert!(syscalls.umounts.lock().expect("lock").is_empty());
        assert!(!media.path().join("alice").exists());
    }

    #[tokio::test]
    async fn generated_paths_stay_distinct() {
        let fx = fixture(FakeSyscalls::default(), true);
        let first = fx
            .executor
            .generate_mount_path("alice", "smb://10.0.0.5/share")
            .expect("first");
        std::fs::create_dir(first.path()).expect("create first");
        let second = fx
            .executor
            .generate_mount_path("alice", "smb://10.0.0.5/share")
            .expect("second");

        assert_ne!(first.path(), second.path());
        assert!(second.path().to_string_lossy().ends_with("share on 10.0.0.5_2"));
    }
}
