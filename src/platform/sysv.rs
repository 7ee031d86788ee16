// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// SysV semaphore wrapper. On platforms without a futex this synthesizes the
// park/wake half of the wait/wake interface: waiters decrement, wakers
// increment, and the counting semantics mean a wake posted before the
// waiter reaches the kernel is never lost.

use std::time::Duration;
#[cfg(not(target_os = "linux"))]
use std::time::Instant;

use crate::error::{Error, Result};
#[cfg(not(target_os = "linux"))]
use crate::spin_mutex::backoff;

/// Derive a SysV IPC key from an object name, via FNV-1a over the name
/// bytes masked to the positive key range.
///
/// Key collisions between distinct names are tolerated: a colliding
/// semaphore only produces extra wakeups, which wait loops already absorb.
pub(crate) fn name_to_key(name: &str) -> libc::key_t {
    let hash = name.bytes().fold(0x811c_9dc5u32, |h, b| {
        (h ^ b as u32).wrapping_mul(0x0100_0193)
    });
    // Key 0 is IPC_PRIVATE; never produce it.
    match hash & 0x7fff_ffff {
        0 => 1,
        key => key as libc::key_t,
    }
}

/// A single SysV semaphore identified by a name-derived key.
///
/// Created with value 0, so a `wait` parks until somebody `post`s.
pub(crate) struct SysvSem {
    id: libc::c_int,
}

impl SysvSem {
    pub(crate) fn open_or_create(name: &str, perm: u32) -> Result<Self> {
        let key = name_to_key(name);
        let id =
            unsafe { libc::semget(key, 1, libc::IPC_CREAT | (perm & 0o777) as libc::c_int) };
        if id == -1 {
            return Err(Error::last_os_error());
        }
        Ok(Self { id })
    }

    fn op(&self, delta: i16, flags: libc::c_short) -> libc::c_int {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: delta as libc::c_short,
            sem_flg: flags,
        };
        unsafe { libc::semop(self.id, &mut buf, 1) }
    }

    /// Increment the semaphore, releasing one parked waiter (or crediting
    /// the next one to arrive).
    pub(crate) fn post(&self) -> Result<()> {
        if self.op(1, 0) == -1 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    /// Decrement the semaphore, parking until a post arrives, the timeout
    /// expires, or a signal interrupts the wait. `None` waits forever.
    pub(crate) fn wait_timed(&self, timeout: Option<Duration>) -> Result<()> {
        match timeout {
            None => {
                if self.op(-1, 0) == -1 {
                    return Err(Error::last_os_error());
                }
                Ok(())
            }
            Some(d) => self.wait_deadline(d),
        }
    }

    #[cfg(target_os = "linux")]
    fn wait_deadline(&self, d: Duration) -> Result<()> {
        // Not exposed by the `libc` crate; declared directly against glibc/musl.
        extern "C" {
            fn semtimedop(
                semid: libc::c_int,
                sops: *mut libc::sembuf,
                nsops: libc::size_t,
                timeout: *const libc::timespec,
            ) -> libc::c_int;
        }
        let ts = libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        };
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: -1,
            sem_flg: 0,
        };
        let ret = unsafe { semtimedop(self.id, &mut buf, 1, &ts) };
        if ret == -1 {
            // semtimedop reports an expired timeout as EAGAIN.
            return match Error::last_os_error() {
                Error::WouldBlock => Err(Error::Timeout),
                e => Err(e),
            };
        }
        Ok(())
    }

    // No semtimedop outside Linux; poll with IPC_NOWAIT and back off
    // adaptively until the deadline.
    #[cfg(not(target_os = "linux"))]
    fn wait_deadline(&self, d: Duration) -> Result<()> {
        let deadline = Instant::now() + d;
        let mut round = 0u32;
        loop {
            if self.op(-1, libc::IPC_NOWAIT as libc::c_short) != -1 {
                return Ok(());
            }
            match Error::last_os_error() {
                Error::WouldBlock => {}
                e => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            round = backoff(round);
        }
    }

    /// Remove the semaphore from the kernel. Concurrent waiters are woken
    /// with an error by the OS.
    pub(crate) fn remove(&self) -> Result<()> {
        let ret = unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) };
        if ret == -1 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    /// Remove the semaphore derived from `name`, if it exists.
    pub(crate) fn remove_by_name(name: &str) -> Result<()> {
        let key = name_to_key(name);
        let id = unsafe { libc::semget(key, 1, 0) };
        if id == -1 {
            return Err(Error::last_os_error());
        }
        let ret = unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
        if ret == -1 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(prefix: &str) -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_sysv_{n}_{}", std::process::id())
    }

    #[test]
    fn post_then_wait() {
        let name = unique_name("post_wait");
        let sem = SysvSem::open_or_create(&name, 0o600).expect("semget");
        sem.post().expect("post");
        sem.wait_timed(Some(Duration::from_millis(100)))
            .expect("wait after post");
        sem.remove().expect("remove");
    }

    #[test]
    fn wait_times_out() {
        let name = unique_name("timeout");
        let sem = SysvSem::open_or_create(&name, 0o600).expect("semget");
        let started = Instant::now();
        assert_eq!(
            sem.wait_timed(Some(Duration::from_millis(50))),
            Err(Error::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
        sem.remove().expect("remove");
    }

    #[test]
    fn remove_by_name_absent() {
        let name = unique_name("absent");
        assert_eq!(SysvSem::remove_by_name(&name), Err(Error::NotFound));
    }

    #[test]
    fn keys_are_positive_and_stable() {
        let k1 = name_to_key("alpha");
        let k2 = name_to_key("alpha");
        assert_eq!(k1, k2);
        assert!(k1 > 0);
        assert!(name_to_key("beta") > 0);
    }
}
