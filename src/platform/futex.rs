// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Linux futex wait/wake. The words these operate on live in shared memory
// mapped by unrelated processes, so FUTEX_PRIVATE_FLAG must never be set.

use std::ptr;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use crate::error::{Error, Result};

/// Park the calling thread on `word` while its value equals `expected`.
///
/// `None` means wait forever. Returns `Ok(())` when woken (including
/// spuriously); the caller's loop re-inspects the word either way.
///
/// - `Err(WouldBlock)`: the word no longer held `expected` at sleep time.
/// - `Err(Timeout)`: the relative timeout expired.
/// - `Err(Interrupted)`: a signal arrived before wakeup.
pub(crate) fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> Result<()> {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(ptr::null::<libc::timespec>(), |t| t as *const _);
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            ptr::null::<u32>(),
            0u32,
        )
    };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// Wake up to `count` threads parked on `word`. Returns the number woken.
pub(crate) fn futex_wake(word: &AtomicU32, count: i32) -> Result<i32> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAKE,
            count,
            ptr::null::<libc::timespec>(),
            ptr::null::<u32>(),
            0u32,
        )
    };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(ret as i32)
}
