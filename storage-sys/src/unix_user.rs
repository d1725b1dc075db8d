// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::CStr;

use crate::error::{Result, SysError};

/// Passwd entry of a local account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Resolve `uid` through the reentrant passwd lookup
pub fn user_for_uid(uid: u32) -> Result<UnixUser> {
    let mut pwd = std::mem::MaybeUninit::<libc::passwd>::uninit();
    let mut pwd_ptr: *mut libc::passwd = std::ptr::null_mut();
    let mut buffer = vec![0_u8; 4096];

    let lookup_result = unsafe {
        libc::getpwuid_r(
            uid,
            pwd.as_mut_ptr(),
            buffer.as_mut_ptr() as *mut libc::c_char,
            buffer.len(),
            &mut pwd_ptr,
        )
    };

    if lookup_result != 0 || pwd_ptr.is_null() {
        tracing::warn!("Failed to resolve passwd entry for UID {}", uid);
        return Err(SysError::UnknownUser(uid));
    }

    let passwd = unsafe { pwd.assume_init() };
    let name = unsafe { CStr::from_ptr(passwd.pw_name) }
        .to_str()
        .map_err(|_| SysError::UnknownUser(uid))?
        .to_string();

    Ok(UnixUser {
        name,
        uid: passwd.pw_uid,
        gid: passwd.pw_gid,
    })
}
