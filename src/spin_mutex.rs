// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Named two-state spin mutex: a busy-wait lock in shared memory for
// platforms or call sites where parking is unavailable or unwanted.
// No timeout support and no fairness.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::error::Result;
use crate::object_name;
use crate::region::MemoryRegion;
use crate::shm::{destroy_memory_object, AccessMode, MemoryObject, OpenMode};

const SPIN_UNLOCKED: u32 = 0;
const SPIN_LOCKED: u32 = 1;

/// Bytes of shared memory a spin mutex occupies.
pub const SPIN_MUTEX_SIZE: usize = 4;

/// Backoff for busy-wait loops. Early rounds issue exponentially more CPU
/// pause hints, later rounds hand the core to the scheduler, and a wait
/// that is clearly going to be long sleeps a millisecond per round.
/// Returns the round number to pass next time.
#[inline]
pub(crate) fn backoff(round: u32) -> u32 {
    match round {
        0..=7 => {
            for _ in 0..(1u32 << round) {
                std::hint::spin_loop();
            }
        }
        8..=23 => std::thread::yield_now(),
        _ => std::thread::sleep(std::time::Duration::from_millis(1)),
    }
    round.saturating_add(1)
}

/// A named, cross-process spin mutex.
///
/// The lock state is a 32-bit word (0 = unlocked, 1 = locked) at the start
/// of a shared memory object named `spin.<name>`. `lock` busy-waits with
/// adaptive backoff; there is no timed variant.
pub struct SpinMutex {
    word: *const AtomicU32,
    // Keeps the mapping (and with it the state word) alive.
    _region: MemoryRegion,
    full_name: String,
}

unsafe impl Send for SpinMutex {}
unsafe impl Sync for SpinMutex {}

impl SpinMutex {
    /// Create or open the named spin mutex. Rollback on partial failure
    /// mirrors [`crate::IpcMutex::new`].
    pub fn new(name: &str, mode: OpenMode, perm: u32) -> Result<Self> {
        object_name::validate(name)?;
        let full_name = format!("{}{name}", object_name::SPIN_PREFIX);

        let (object, created) = MemoryObject::create_or_open(
            &full_name,
            mode,
            AccessMode::ReadWrite,
            perm,
        )?;
        match Self::map_word(&object, created, &full_name) {
            Ok(mutex) => {
                debug!(name, created, "spin mutex ready");
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

    fn map_word(object: &MemoryObject, created: bool, full_name: &str) -> Result<Self> {
        object.truncate(SPIN_MUTEX_SIZE as u64)?;
        let region = MemoryRegion::new(object, AccessMode::ReadWrite, 0, SPIN_MUTEX_SIZE)?;
        let word = region.as_mut_ptr() as *const AtomicU32;
        let mutex = Self {
            word,
            _region: region,
            full_name: full_name.to_string(),
        };
        if created {
            mutex.word().store(SPIN_UNLOCKED, Ordering::Release);
        }
        Ok(mutex)
    }

    fn word(&self) -> &AtomicU32 {
        unsafe { &*self.word }
    }

    /// Acquire the lock, busy-waiting until it is free.
    pub fn lock(&self) {
        let mut round = 0u32;
        while !self.try_lock() {
            round = backoff(round);
        }
    }

    /// Acquire the lock iff it is free right now.
    pub fn try_lock(&self) -> bool {
        self.word()
            .compare_exchange(
                SPIN_UNLOCKED,
                SPIN_LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Release the lock.
    pub fn unlock(&self) {
        self.word().store(SPIN_UNLOCKED, Ordering::Release);
    }

    /// Release the mapping and remove the named object.
    pub fn destroy(self) -> Result<()> {
        let full_name = self.full_name.clone();
        drop(self);
        destroy_memory_object(&full_name)
    }
}

/// Remove the named spin mutex without opening it. Returns `NotFound` if
/// no such mutex exists.
pub fn destroy_spin_mutex(name: &str) -> Result<()> {
    object_name::validate(name)?;
    destroy_memory_object(&format!("{}{name}", object_name::SPIN_PREFIX))
}
