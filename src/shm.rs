// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Named shared memory objects. An object persists in the kernel beyond any
// single holder; only an explicit destroy removes the name. Mapping is the
// region layer's job.

use std::os::unix::io::{AsRawFd, RawFd};

use tracing::debug;

use crate::error::{Error, Result};
use crate::object_name;
use crate::platform::posix;

/// How a named object is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create exclusively; fail with `AlreadyExists` if the name exists.
    CreateOnly,
    /// Open an existing object; fail with `NotFound` if it is absent.
    OpenOnly,
    /// Create if missing, open if present, racing opens resolved by retry.
    OpenOrCreate,
}

/// Access intent for the object and its subsequent mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Retry bound for the `OpenOrCreate` create/open race. An adversarial
/// unlink loop could otherwise livelock us.
const OPEN_OR_CREATE_ATTEMPTS: usize = 16;

/// A named, kernel-persistent shared memory object.
///
/// The handle owns a file descriptor usable for mapping; dropping the
/// handle closes the descriptor without touching the name. Use
/// [`MemoryObject::destroy`] (or [`destroy_memory_object`]) to unlink.
pub struct MemoryObject {
    fd: RawFd,
    name: String,
    posix_name: String,
}

impl MemoryObject {
    /// Obtain a named object, creating it if the mode allows.
    ///
    /// Returns the object and whether *this call* created it. `perm` may
    /// only carry the low nine permission bits; anything else fails with
    /// `InvalidArgument`. For `OpenOrCreate` the create/open race against
    /// concurrent destroys is retried up to a fixed bound, after which the
    /// last error surfaces.
    pub fn create_or_open(
        name: &str,
        mode: OpenMode,
        access: AccessMode,
        perm: u32,
    ) -> Result<(Self, bool)> {
        object_name::validate(name)?;
        if perm & !0o777 != 0 {
            return Err(Error::InvalidArgument(format!(
                "permission bits above 0o777: {perm:#o}"
            )));
        }

        let result = match mode {
            OpenMode::CreateOnly => Self::open_once(name, true, access, perm).map(|o| (o, true)),
            OpenMode::OpenOnly => Self::open_once(name, false, access, perm).map(|o| (o, false)),
            OpenMode::OpenOrCreate => {
                let mut outcome = None;
                for _ in 0..OPEN_OR_CREATE_ATTEMPTS {
                    match Self::open_once(name, true, access, perm) {
                        Ok(o) => {
                            outcome = Some((o, true));
                            break;
                        }
                        Err(Error::AlreadyExists) => {}
                        Err(e) => return Err(e),
                    }
                    match Self::open_once(name, false, access, perm) {
                        Ok(o) => {
                            outcome = Some((o, false));
                            break;
                        }
                        // Unlinked between our two calls; go around again.
                        Err(Error::NotFound) => {}
                        Err(e) => return Err(e),
                    }
                }
                // Exhausting the bound means every round ended on the
                // open arm's NotFound; surface that last error.
                outcome.ok_or(Error::NotFound)
            }
        };

        if let Ok((obj, created)) = &result {
            debug!(name, created, fd = obj.fd, "memory object acquired");
        }
        result
    }

    fn open_once(name: &str, create_excl: bool, access: AccessMode, perm: u32) -> Result<Self> {
        let posix_name = object_name::make_posix_name(name);
        let fd = posix::shm_open_once(&posix_name, create_excl, access, perm)?;
        Ok(Self {
            fd,
            name: name.to_string(),
            posix_name,
        })
    }

    /// The name this object was opened under (without the POSIX slash).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current object size in bytes, queried from the kernel.
    pub fn size(&self) -> Result<u64> {
        posix::fstat_size(self.fd)
    }

    /// Grow the object to `size` bytes.
    ///
    /// The object size is monotonic: a request not larger than the current
    /// size is a no-op, so concurrent holders can never observe a shrink.
    pub fn truncate(&self, size: u64) -> Result<()> {
        if size <= self.size()? {
            return Ok(());
        }
        posix::ftruncate(self.fd, size)
    }

    /// Release the handle without removing the name.
    pub fn close(self) {
        // Drop does the work.
    }

    /// Close the handle and unlink the name. The bytes survive for holders
    /// that still have the object mapped; the name becomes reusable.
    pub fn destroy(self) -> Result<()> {
        let posix_name = self.posix_name.clone();
        let name = self.name.clone();
        drop(self);
        debug!(%name, "memory object destroyed");
        posix::shm_unlink(&posix_name)
    }
}

impl AsRawFd for MemoryObject {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for MemoryObject {
    fn drop(&mut self) {
        if self.fd >= 0 {
            posix::close(self.fd);
        }
    }
}

/// Unlink a named object without opening it first.
///
/// Returns `NotFound` if no such name exists; idempotency across racing
/// destroys is not promised.
pub fn destroy_memory_object(name: &str) -> Result<()> {
    object_name::validate(name)?;
    posix::shm_unlink(&object_name::make_posix_name(name))
}
