// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Three-state fast-path/slow-path mutex over a shared 32-bit word.
// State protocol: 0 = unlocked, 1 = locked without waiters, 2 = locked
// with possibly-parked waiters. The word is only ever touched with atomic
// operations; all cooperating processes must map it at a native-aligned
// address.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::wait_waker::WaitWaker;

pub(crate) const UNLOCKED: u32 = 0;
pub(crate) const LOCKED_NO_WAITERS: u32 = 1;
pub(crate) const LOCKED_HAVE_WAITERS: u32 = 2;

/// Bounded busy-wait budget before parking (and before waking on release).
const SPIN_COUNT: usize = 100;

/// Bytes of shared memory an in-place mutex occupies: the 32-bit state
/// word plus padding that keeps anything placed after it naturally aligned.
pub const INPLACE_MUTEX_SIZE: usize = 8;

/// A mutex whose entire state lives in a caller-provided 32-bit word,
/// typically inside a shared memory region.
///
/// The wait/wake strategy `W` decides what a blocked waiter does: park on
/// a kernel primitive or spin. Independent processes coordinate through
/// nothing but the word (and, for parking strategies, the kernel object
/// the strategy wraps).
///
/// A process that dies while holding the lock leaves the word locked;
/// there is no recovery, and subsequent waiters block forever.
pub struct InplaceMutex<W: WaitWaker> {
    word: *const AtomicU32,
    ww: W,
}

unsafe impl<W: WaitWaker + Send> Send for InplaceMutex<W> {}
unsafe impl<W: WaitWaker + Sync> Sync for InplaceMutex<W> {}

impl<W: WaitWaker> InplaceMutex<W> {
    /// Bind a mutex to the state word at `word`.
    ///
    /// # Safety
    ///
    /// `word` must point to a 4-byte-aligned `u32` that stays valid and
    /// mapped for the lifetime of the returned value, and every process
    /// touching it must do so through this protocol.
    pub unsafe fn from_raw(word: *mut u32, ww: W) -> Self {
        Self {
            word: word as *const AtomicU32,
            ww,
        }
    }

    fn word(&self) -> &AtomicU32 {
        unsafe { &*self.word }
    }

    /// Write the initial unlocked state. Only the creator of the backing
    /// memory calls this; openers take the existing value as-is.
    pub fn init(&self) {
        self.word().store(UNLOCKED, Ordering::Release);
    }

    /// Acquire the lock, waiting as long as it takes.
    ///
    /// # Panics
    ///
    /// Panics on any error from the wait/wake strategy other than the
    /// retryable sentinels. There is no recovery once the protocol state
    /// is in doubt.
    pub fn lock(&self) {
        if let Err(e) = self.lock_deadline(None) {
            panic!("failed to lock in-place mutex: {e}");
        }
    }

    /// Acquire the lock iff it is free right now.
    pub fn try_lock(&self) -> bool {
        self.word()
            .compare_exchange(
                UNLOCKED,
                LOCKED_NO_WAITERS,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// Returns `Ok(false)` once at least `timeout` has elapsed without an
    /// acquisition; spurious wakeups resume waiting with the remaining
    /// budget. Non-timeout errors propagate.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<bool> {
        match self.lock_deadline(Some(Instant::now() + timeout)) {
            Ok(()) => Ok(true),
            Err(Error::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Release the lock, waking one parked waiter if any may exist.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is not locked: unlocking an unlocked mutex is a
    /// protocol violation, not a recoverable condition.
    pub fn unlock(&self) {
        let word = self.word();
        let old = word.load(Ordering::Acquire);
        if old == LOCKED_HAVE_WAITERS {
            word.store(UNLOCKED, Ordering::Release);
            self.ww.wake();
            return;
        }
        if old == UNLOCKED {
            panic!("unlock of unlocked mutex");
        }
        if word.swap(UNLOCKED, Ordering::AcqRel) == LOCKED_NO_WAITERS {
            return;
        }
        // A waiter parked between the load and the swap. If a fast-path
        // acquirer reclaims the lock within the spin budget, it inherits
        // the duty to wake on its own release; otherwise wake one now.
        for _ in 0..SPIN_COUNT {
            if word.load(Ordering::Acquire) != UNLOCKED
                && word
                    .compare_exchange(
                        LOCKED_NO_WAITERS,
                        LOCKED_HAVE_WAITERS,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                return;
            }
            thread::yield_now();
        }
        self.ww.wake();
    }

    fn lock_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        for _ in 0..SPIN_COUNT {
            if self.try_lock() {
                return Ok(());
            }
            thread::yield_now();
        }

        let word = self.word();
        let mut old = word.load(Ordering::Acquire);
        if old != LOCKED_HAVE_WAITERS {
            old = word.swap(LOCKED_HAVE_WAITERS, Ordering::AcqRel);
        }
        while old != UNLOCKED {
            match self.ww.wait(remaining(deadline)?) {
                // Woken, spuriously woken, raced the parking value check,
                // or interrupted by a signal: re-inspect the word.
                Ok(()) | Err(Error::WouldBlock) | Err(Error::Interrupted) => {}
                Err(e) => return Err(e),
            }
            old = word.swap(LOCKED_HAVE_WAITERS, Ordering::AcqRel);
        }
        Ok(())
    }
}

/// Budget left until `deadline`, or `Timeout` once it has passed.
fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(d) => {
            let now = Instant::now();
            if now >= d {
                Err(Error::Timeout)
            } else {
                Ok(Some(d - now))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_waker::SpinWaitWaker;
    use std::sync::Arc;

    // Word and mutex bundled so the word outlives the raw pointer into it.
    struct TestMutex {
        _word: Box<AtomicU32>,
        m: InplaceMutex<SpinWaitWaker>,
    }

    fn new_test_mutex() -> Arc<TestMutex> {
        let word = Box::new(AtomicU32::new(UNLOCKED));
        let ptr = &*word as *const AtomicU32 as *mut u32;
        let m = unsafe { InplaceMutex::from_raw(ptr, SpinWaitWaker) };
        Arc::new(TestMutex { _word: word, m })
    }

    #[test]
    fn try_lock_takes_free_mutex_only() {
        let t = new_test_mutex();
        assert!(t.m.try_lock());
        assert!(!t.m.try_lock());
        t.m.unlock();
        assert!(t.m.try_lock());
        t.m.unlock();
    }

    #[test]
    #[should_panic(expected = "unlock of unlocked mutex")]
    fn unlock_of_unlocked_panics() {
        let t = new_test_mutex();
        t.m.unlock();
    }

    #[test]
    fn lock_timeout_on_held_mutex_expires() {
        let t = new_test_mutex();
        t.m.lock();
        let started = Instant::now();
        let got = t.m.lock_timeout(Duration::from_millis(50)).expect("timed lock");
        assert!(!got);
        assert!(started.elapsed() >= Duration::from_millis(50));
        t.m.unlock();
    }

    #[test]
    fn zero_timeout_on_held_mutex_returns_quickly() {
        let t = new_test_mutex();
        t.m.lock();
        let started = Instant::now();
        let got = t.m.lock_timeout(Duration::ZERO).expect("timed lock");
        assert!(!got);
        assert!(started.elapsed() < Duration::from_millis(100));
        t.m.unlock();
    }

    #[test]
    fn contended_increments_are_exact() {
        let t = new_test_mutex();
        let counter = Arc::new(std::sync::Mutex::new(0u64));
        let threads = 8;
        let per_thread = 200;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let t = Arc::clone(&t);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        t.m.lock();
                        *counter.lock().unwrap() += 1;
                        t.m.unlock();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), threads * per_thread);
    }

    #[test]
    fn word_stays_in_protocol_range() {
        let t = new_test_mutex();
        let stop = Arc::new(AtomicU32::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    for _ in 0..100 {
                        t.m.lock();
                        t.m.unlock();
                    }
                })
            })
            .collect();

        let observer = {
            let t = Arc::clone(&t);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while stop.load(Ordering::Acquire) == 0 {
                    let v = t._word.load(Ordering::Acquire);
                    assert!(v <= LOCKED_HAVE_WAITERS, "state word out of range: {v}");
                }
            })
        };

        for h in workers {
            h.join().unwrap();
        }
        stop.store(1, Ordering::Release);
        observer.join().unwrap();
    }
}
