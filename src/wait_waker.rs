// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Pluggable wait/wake strategies bound to a mutex state word. The futex
// strategy parks in the kernel; the SysV strategy parks on a semaphore
// where no futex exists; the spin strategy never parks at all.

use std::time::Duration;

use crate::error::Result;

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::atomic::AtomicU32;

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::inplace_mutex::LOCKED_HAVE_WAITERS;
#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::platform::futex;
use crate::platform::sysv::SysvSem;

/// What a blocked mutex waiter does until the lock might be free again.
///
/// `wait` suspends (or yields) until woken, timed out, or interrupted; it
/// must tolerate spurious wakeups, since the caller's loop re-inspects the
/// state word after every return. `wake` releases exactly one waiter —
/// waking more would stampede the lock.
pub trait WaitWaker {
    /// Suspend until woken or `timeout` elapses (`None` = forever).
    ///
    /// `WouldBlock` and `Interrupted` are retry cues, not failures.
    fn wait(&self, timeout: Option<Duration>) -> Result<()>;

    /// Wake one parked waiter, if any.
    fn wake(&self);
}

/// Futex-backed strategy: waiters sleep in the kernel keyed on the state
/// word's address, so processes sharing the mapping need no other
/// rendezvous.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub struct FutexWaitWaker {
    word: *const AtomicU32,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe impl Send for FutexWaitWaker {}
#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe impl Sync for FutexWaitWaker {}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl FutexWaitWaker {
    /// Bind the strategy to the state word at `word`.
    ///
    /// # Safety
    ///
    /// `word` must point to a 4-byte-aligned `u32` that stays valid and
    /// mapped for the lifetime of the returned value.
    pub unsafe fn new(word: *mut u32) -> Self {
        Self {
            word: word as *const AtomicU32,
        }
    }

    fn word(&self) -> &AtomicU32 {
        unsafe { &*self.word }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl WaitWaker for FutexWaitWaker {
    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        // Sleep only while the word still says "locked with waiters"; if it
        // changed under us the kernel reports WouldBlock and the caller's
        // loop re-inspects.
        futex::futex_wait(self.word(), LOCKED_HAVE_WAITERS, timeout)
    }

    fn wake(&self) {
        if let Err(e) = futex::futex_wake(self.word(), 1) {
            panic!("futex wake failed: {e}");
        }
    }
}

/// SysV-semaphore strategy for platforms without a futex.
///
/// The semaphore counts: a wake posted before the waiter reaches the
/// kernel credits the next wait instead of being lost. Stale credits only
/// cause spurious wakeups, which the mutex loop absorbs.
pub struct SemWaitWaker {
    sem: SysvSem,
}

impl SemWaitWaker {
    /// Open (or create) the semaphore derived from the mutex name.
    pub fn open(name: &str, perm: u32) -> Result<Self> {
        Ok(Self {
            sem: SysvSem::open_or_create(name, perm)?,
        })
    }

    /// Remove the semaphore derived from `name` from the kernel.
    pub fn remove(name: &str) -> Result<()> {
        SysvSem::remove_by_name(name)
    }
}

impl WaitWaker for SemWaitWaker {
    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.sem.wait_timed(timeout)
    }

    fn wake(&self) {
        if let Err(e) = self.sem.post() {
            panic!("semaphore post failed: {e}");
        }
    }
}

/// Never parks: `wait` yields the scheduler and reports success, `wake`
/// does nothing. Timed waits still expire because the mutex loop tracks
/// the deadline itself.
pub struct SpinWaitWaker;

impl WaitWaker for SpinWaitWaker {
    fn wait(&self, _timeout: Option<Duration>) -> Result<()> {
        std::thread::yield_now();
        Ok(())
    }

    fn wake(&self) {}
}
