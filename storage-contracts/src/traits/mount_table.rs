// SPDX-License-Identifier: GPL-3.0-only

use storage_types::MountTable;

use crate::StorageError;

/// Read access to the live system mount table
pub trait MountTableSource: Send + Sync {
    fn snapshot(&self) -> Result<MountTable, StorageError>;
}
