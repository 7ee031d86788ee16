// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// RAII guard that holds a named mutex for the lifetime of the access,
// providing read/write to a shared memory region.

use crate::error::{Error, Result};
use crate::mutex::IpcMutex;
use crate::region::MemoryRegion;
use crate::shm::AccessMode;

/// RAII guard: locks the mutex on construction, unlocks on drop.
/// Provides `read()` / `write()` access to the region's bytes.
pub struct ScopedAccess<'a> {
    region: &'a MemoryRegion,
    mutex: &'a IpcMutex,
}

impl<'a> ScopedAccess<'a> {
    /// Create a new scoped access guard. Locks `mutex` immediately.
    pub fn new(region: &'a MemoryRegion, mutex: &'a IpcMutex) -> Self {
        mutex.lock();
        Self { region, mutex }
    }

    /// The region bytes, valid for the lifetime of the guard.
    pub fn read(&self) -> &[u8] {
        self.region.data()
    }

    /// Copy `buf` into the region.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` on a read-only region; `InvalidArgument` when
    /// `buf` is larger than the region.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        if self.region.access() == AccessMode::ReadOnly {
            return Err(Error::PermissionDenied);
        }
        if buf.len() > self.region.size() {
            return Err(Error::InvalidArgument(format!(
                "buffer too large for region ({} > {})",
                buf.len(),
                self.region.size()
            )));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), self.region.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// The region guarded by this access.
    pub fn region(&self) -> &MemoryRegion {
        self.region
    }
}

impl Drop for ScopedAccess<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
