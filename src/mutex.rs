// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Named inter-process mutex: an in-place mutex bound to a shared memory
// region obtained by name. On Linux the waiters park on a futex; other
// unixes park on a SysV semaphore derived from the same name.

use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::inplace_mutex::{InplaceMutex, INPLACE_MUTEX_SIZE};
use crate::object_name;
use crate::region::MemoryRegion;
use crate::shm::{destroy_memory_object, AccessMode, MemoryObject, OpenMode};

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::wait_waker::FutexWaitWaker as DefaultWaitWaker;
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
use crate::wait_waker::SemWaitWaker as DefaultWaitWaker;

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
use crate::platform::sysv::SysvSem;

/// A named, cross-process mutex.
///
/// The entire lock state is a 32-bit word at the start of a shared memory
/// object named `mutex.<name>`; any process opening the same name operates
/// on the same word. Dropping the handle releases the mapping and leaves
/// the named object (and its state) behind; [`IpcMutex::destroy`] removes
/// the name as well.
///
/// There is no robustness against crashed holders: a process that dies
/// while holding the lock leaves it held forever.
pub struct IpcMutex {
    inner: InplaceMutex<DefaultWaitWaker>,
    // Keeps the mapping (and with it the state word) alive.
    _region: MemoryRegion,
    full_name: String,
}

impl IpcMutex {
    /// Create or open the named mutex.
    ///
    /// The creator truncates the backing object to the mutex footprint and
    /// initializes the word to unlocked; openers take the existing state
    /// as-is. A failure partway through rolls back in reverse order:
    /// unmap, close, and unlink iff this call created the name.
    pub fn new(name: &str, mode: OpenMode, perm: u32) -> Result<Self> {
        object_name::validate(name)?;
        let full_name = format!("{}{name}", object_name::MUTEX_PREFIX);

        let (object, created) = MemoryObject::create_or_open(
            &full_name,
            mode,
            AccessMode::ReadWrite,
            perm,
        )?;
        match Self::map_and_bind(&object, created, &full_name, perm) {
            Ok(mutex) => {
                debug!(name, created, "ipc mutex ready");
                Ok(mutex)
            }
            Err(e) => {
                if created {
                    let _ = object.destroy();
                }
                Err(e)
            }
        }
    }

    fn map_and_bind(
        object: &MemoryObject,
        created: bool,
        full_name: &str,
        perm: u32,
    ) -> Result<Self> {
        object.truncate(INPLACE_MUTEX_SIZE as u64)?;
        let region = MemoryRegion::new(object, AccessMode::ReadWrite, 0, INPLACE_MUTEX_SIZE)?;
        let word = region.as_mut_ptr() as *mut u32;
        let ww = Self::make_waker(full_name, word, perm)?;
        // Safety: `word` points into `region`, which the returned handle
        // owns for its whole lifetime; the mapping base is page-aligned.
        let inner = unsafe { InplaceMutex::from_raw(word, ww) };
        if created {
            inner.init();
        }
        Ok(Self {
            inner,
            _region: region,
            full_name: full_name.to_string(),
        })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn make_waker(_full_name: &str, word: *mut u32, _perm: u32) -> Result<DefaultWaitWaker> {
        // Safety: see map_and_bind — the word lives as long as the handle.
        Ok(unsafe { DefaultWaitWaker::new(word) })
    }

    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    fn make_waker(full_name: &str, _word: *mut u32, perm: u32) -> Result<DefaultWaitWaker> {
        DefaultWaitWaker::open(full_name, perm)
    }

    /// Acquire the lock, waiting as long as it takes.
    ///
    /// # Panics
    ///
    /// Panics on non-retryable strategy errors; see
    /// [`InplaceMutex::lock`].
    pub fn lock(&self) {
        self.inner.lock();
    }

    /// Acquire the lock iff it is free right now.
    pub fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// `Ok(false)` means the budget elapsed; other errors propagate.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<bool> {
        self.inner.lock_timeout(timeout)
    }

    /// Release the lock, waking one parked waiter if any may exist.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is not locked.
    pub fn unlock(&self) {
        self.inner.unlock();
    }

    /// Release the mapping and remove the named object. Other processes
    /// still holding the mutex open keep their mapping until they drop it.
    pub fn destroy(self) -> Result<()> {
        let full_name = self.full_name.clone();
        drop(self);
        remove_backing(&full_name)
    }
}

fn remove_backing(full_name: &str) -> Result<()> {
    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    let _ = SysvSem::remove_by_name(full_name);
    destroy_memory_object(full_name)
}

/// Remove the named mutex without opening it. Returns `NotFound` if no
/// such mutex exists.
pub fn destroy_ipc_mutex(name: &str) -> Result<()> {
    object_name::validate(name)?;
    remove_backing(&format!("{}{name}", object_name::MUTEX_PREFIX))
}
