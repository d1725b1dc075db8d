// SPDX-License-Identifier: GPL-3.0-only

//! CIFS share addressing, mount option strings and the mount(2) seam

use nix::mount::{MntFlags, MsFlags};
use storage_contracts::MountError;
use storage_types::MountOptions;

use crate::error::{Result, SysError};

const SMB_SCHEME: &str = "smb://";
const CIFS_FS_TYPE: &str = "cifs";
const MASKED_PASSWORD: &str = "******";

/// A `smb://host/share[/...]` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CifsShare {
    pub host: String,
    pub share: String,
}

impl CifsShare {
    /// Parse a logical share URI. Anything below the share name is ignored.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(SMB_SCHEME)
            .ok_or_else(|| SysError::InvalidSource(uri.to_string()))?;

        let mut parts = rest.split('/');
        let host = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        if host.is_empty() || share.is_empty() {
            return Err(SysError::InvalidSource(uri.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            share: share.to_string(),
        })
    }

    /// Kernel-facing source, `//host/share`
    pub fn source(&self) -> String {
        format!("//{}/{}", self.host, self.share)
    }

    pub fn is_localhost(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
    }

    /// Directory name under the managed root, `<share> on <host>`
    pub fn dir_name(&self) -> String {
        format!("{} on {}", self.share, self.host)
    }
}

/// Build the `-o` option string for a CIFS mount.
///
/// Credentials are only used when both user and password are given,
/// otherwise the share is mounted as guest. The owner ids make the
/// mounted files belong to the invoking user.
pub fn build_cifs_options(
    opts: &MountOptions,
    uid: u32,
    gid: u32,
    is_localhost: bool,
) -> String {
    let mut param = String::new();

    let user = opts.user.as_deref().filter(|u| !u.is_empty());
    let passwd = opts.passwd.as_deref().filter(|p| !p.is_empty());
    match (user, passwd) {
        (Some(user), Some(passwd)) => param.push_str(&format!("user={user},pass={passwd},")),
        _ => param.push_str("guest,user=nobody,"),
    }

    if let Some(domain) = opts.domain.as_deref().filter(|d| !d.is_empty()) {
        param.push_str(&format!("dom={domain},"));
    }

    if let Some(timeout) = opts.timeout_seconds {
        param.push_str(&format!("echo_interval=1,wait_reconnect_timeout={timeout},"));
    }

    param.push_str(&format!("uid={uid},gid={gid},"));
    param.push_str("iocharset=utf8,vers=default");

    if is_localhost {
        param.insert_str(0, "ip=127.0.0.1,");
    }

    param
}

/// Replace the `pass=` value so the option string can be logged
pub fn mask_password(options: &str) -> String {
    options
        .split(',')
        .map(|opt| {
            if opt.starts_with("pass=") {
                format!("pass={MASKED_PASSWORD}")
            } else {
                opt.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// mount(2)/umount(2) for CIFS targets.
///
/// Failures are reported as [`MountError::Syscall`] carrying the raw errno.
pub trait MountSyscalls: Send + Sync {
    fn mount(&self, source: &str, target: &str, options: &str) -> std::result::Result<(), MountError>;

    fn umount(&self, target: &str) -> std::result::Result<(), MountError>;
}

/// Real syscalls through nix
#[derive(Debug, Default, Clone, Copy)]
pub struct NixMountSyscalls;

impl MountSyscalls for NixMountSyscalls {
    fn mount(&self, source: &str, target: &str, options: &str) -> std::result::Result<(), MountError> {
        nix::mount::mount(
            Some(source),
            target,
            Some(CIFS_FS_TYPE),
            MsFlags::empty(),
            Some(options),
        )
        .map_err(errno_to_mount_error)
    }

    fn umount(&self, target: &str) -> std::result::Result<(), MountError> {
        nix::mount::umount2(target, MntFlags::empty()).map_err(errno_to_mount_error)
    }
}

fn errno_to_mount_error(errno: nix::errno::Errno) -> MountError {
    MountError::Syscall {
        errno: errno as i32,
        message: errno.desc().to_string(),
    }
}
