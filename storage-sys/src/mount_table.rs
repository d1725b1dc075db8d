// SPDX-License-Identifier: GPL-3.0-only

//! Mount table inspector backed by `/proc/self/mountinfo`

use std::fs;
use std::path::{Path, PathBuf};

use storage_contracts::{MountTableSource, StorageError};
use storage_types::{MountEntry, MountTable};

use crate::error::{Result, SysError};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Reads the live mount table on every snapshot.
#[derive(Debug, Clone)]
pub struct ProcMountTable {
    path: PathBuf,
}

impl ProcMountTable {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(MOUNTINFO_PATH),
        }
    }

    /// Read from an alternative mountinfo file (used by tests)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTableSource for ProcMountTable {
    fn snapshot(&self) -> std::result::Result<MountTable, StorageError> {
        read_mount_table_from(&self.path).map_err(Into::into)
    }
}

pub fn read_mount_table() -> Result<MountTable> {
    read_mount_table_from(Path::new(MOUNTINFO_PATH))
}

fn read_mount_table_from(path: &Path) -> Result<MountTable> {
    let content = fs::read_to_string(path)?;
    parse_mountinfo(&content)
}

/// Parse mountinfo(5) text.
///
/// `source` and `fs_type` come from after the ` - ` separator; per-mount
/// options and superblock options are concatenated so that filesystem
/// specific keys such as `uid=` can be looked up.
pub fn parse_mountinfo(input: &str) -> Result<MountTable> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let (left, right) = line
            .split_once(" - ")
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;

        let mut left_fields = left.split_whitespace();
        let target = left_fields
            .nth(4)
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;
        let mount_options = left_fields.next().unwrap_or_default();

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields
            .next()
            .ok_or_else(|| SysError::InvalidMountInfoLine(line.to_string()))?;
        let source = right_fields.next().unwrap_or("none");
        let super_options = right_fields.next().unwrap_or_default();

        let options = mount_options
            .split(',')
            .chain(super_options.split(','))
            .filter(|opt| !opt.is_empty())
            .map(unescape_mount_field)
            .collect();

        entries.push(MountEntry {
            source: unescape_mount_field(source),
            target: unescape_mount_field(target),
            fs_type: unescape_mount_field(fs_type),
            options,
        });
    }

    Ok(MountTable::new(entries))
}

/// Undo the octal escaping the kernel applies to spaces, tabs and
/// backslashes (e.g. `\040` -> ` `)
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..=index + 3]
                .iter()
                .all(|b| (b'0'..=b'7').contains(b))
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}
