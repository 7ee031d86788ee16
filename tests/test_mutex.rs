// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Unit tests for the named three-state mutex: mutual exclusion across
// handles, timed locking, destroy lifecycle, and the scoped-access guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use memipc::{
    destroy_ipc_mutex, destroy_memory_object, AccessMode, Error, IpcMutex, MemoryObject,
    MemoryRegion, OpenMode, ScopedAccess,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_mtx_{n}_{}", std::process::id())
}

/// A shared u64 counter living in its own named memory object.
fn create_counter_object(name: &str) -> MemoryObject {
    let _ = destroy_memory_object(name);
    let (obj, _) =
        MemoryObject::create_or_open(name, OpenMode::CreateOnly, AccessMode::ReadWrite, 0o600)
            .expect("create counter object");
    obj.truncate(8).expect("truncate");
    obj
}

fn read_counter(region: &MemoryRegion) -> u64 {
    unsafe { (region.as_ptr() as *const u64).read_volatile() }
}

fn bump_counter(region: &MemoryRegion) {
    // Deliberately not atomic: the mutex is what makes this safe.
    unsafe {
        let p = region.as_mut_ptr() as *mut u64;
        p.write_volatile(p.read_volatile() + 1);
    }
}

#[test]
fn create_lock_unlock() {
    let name = unique_name("basic");
    let _ = destroy_ipc_mutex(&name);

    let mutex = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    mutex.lock();
    mutex.unlock();

    assert!(mutex.try_lock());
    assert!(!mutex.try_lock());
    mutex.unlock();

    mutex.destroy().expect("destroy");
}

#[test]
fn open_only_absent_is_not_found() {
    let name = unique_name("absent");
    let _ = destroy_ipc_mutex(&name);

    assert_eq!(
        IpcMutex::new(&name, OpenMode::OpenOnly, 0o600).err(),
        Some(Error::NotFound)
    );
}

#[test]
fn create_only_existing_fails() {
    let name = unique_name("exclusive");
    let _ = destroy_ipc_mutex(&name);

    let mutex = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    assert_eq!(
        IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).err(),
        Some(Error::AlreadyExists)
    );
    mutex.destroy().expect("destroy");
}

#[test]
fn state_is_shared_across_handles() {
    let name = unique_name("two_handles");
    let _ = destroy_ipc_mutex(&name);

    let m1 = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    let m2 = IpcMutex::new(&name, OpenMode::OpenOnly, 0o600).expect("open");

    m1.lock();
    assert!(!m2.try_lock());
    m1.unlock();
    assert!(m2.try_lock());
    m2.unlock();

    drop(m2);
    m1.destroy().expect("destroy");
}

#[test]
fn contended_increments_are_exact() {
    let mutex_name = unique_name("contended");
    let counter_name = unique_name("contended_ctr");
    let _ = destroy_ipc_mutex(&mutex_name);

    let counter_obj = create_counter_object(&counter_name);
    let _keep = IpcMutex::new(&mutex_name, OpenMode::CreateOnly, 0o600).expect("create");

    let threads = 8;
    let per_thread = 100u64;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mutex_name = mutex_name.clone();
            let counter_name = counter_name.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Every worker opens its own handles, as a separate
                // process would.
                let mutex =
                    IpcMutex::new(&mutex_name, OpenMode::OpenOnly, 0o600).expect("open mutex");
                let (obj, _) = MemoryObject::create_or_open(
                    &counter_name,
                    OpenMode::OpenOnly,
                    AccessMode::ReadWrite,
                    0o600,
                )
                .expect("open counter");
                let region =
                    MemoryRegion::new(&obj, AccessMode::ReadWrite, 0, 8).expect("map counter");

                barrier.wait();
                for _ in 0..per_thread {
                    mutex.lock();
                    bump_counter(&region);
                    mutex.unlock();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let region = MemoryRegion::new(&counter_obj, AccessMode::ReadOnly, 0, 8).expect("map");
    assert_eq!(read_counter(&region), threads as u64 * per_thread);

    _keep.destroy().expect("destroy mutex");
    counter_obj.destroy().expect("destroy counter");
}

#[test]
fn lock_timeout_expires_while_held() {
    let name = unique_name("timeout");
    let _ = destroy_ipc_mutex(&name);

    let holder = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    holder.lock();

    let contender_name = name.clone();
    let t = thread::spawn(move || {
        let contender =
            IpcMutex::new(&contender_name, OpenMode::OpenOnly, 0o600).expect("open");
        let started = Instant::now();
        let got = contender
            .lock_timeout(Duration::from_millis(200))
            .expect("timed lock");
        let elapsed = started.elapsed();
        assert!(!got, "lock should not be acquirable while held");
        assert!(elapsed >= Duration::from_millis(200), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "returned late: {elapsed:?}");
    });

    thread::sleep(Duration::from_millis(500));
    holder.unlock();
    t.join().unwrap();

    holder.destroy().expect("destroy");
}

#[test]
fn zero_timeout_on_held_mutex_returns_quickly() {
    let name = unique_name("zero_timeout");
    let _ = destroy_ipc_mutex(&name);

    let mutex = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    mutex.lock();

    let started = Instant::now();
    let got = mutex.lock_timeout(Duration::ZERO).expect("timed lock");
    assert!(!got);
    assert!(started.elapsed() < Duration::from_millis(100));

    mutex.unlock();
    mutex.destroy().expect("destroy");
}

#[test]
fn lock_timeout_succeeds_once_released() {
    let name = unique_name("timeout_release");
    let _ = destroy_ipc_mutex(&name);

    let holder = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    holder.lock();

    let contender_name = name.clone();
    let t = thread::spawn(move || {
        let contender =
            IpcMutex::new(&contender_name, OpenMode::OpenOnly, 0o600).expect("open");
        let got = contender
            .lock_timeout(Duration::from_secs(5))
            .expect("timed lock");
        assert!(got, "lock should arrive once the holder releases");
        contender.unlock();
    });

    thread::sleep(Duration::from_millis(50));
    holder.unlock();
    t.join().unwrap();

    holder.destroy().expect("destroy");
}

#[test]
#[should_panic(expected = "unlock of unlocked mutex")]
fn unlock_of_never_locked_mutex_panics() {
    let name = unique_name("unlock_unlocked");
    let _ = destroy_ipc_mutex(&name);

    let mutex = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    mutex.unlock();
}

#[test]
fn destroy_then_open_is_not_found() {
    let name = unique_name("destroy_cycle");
    let _ = destroy_ipc_mutex(&name);

    let m1 = IpcMutex::new(&name, OpenMode::CreateOnly, 0o600).expect("create");
    let m2 = IpcMutex::new(&name, OpenMode::OpenOnly, 0o600).expect("open");
    m2.lock();
    m2.unlock();
    drop(m2);

    m1.destroy().expect("destroy");
    assert_eq!(
        IpcMutex::new(&name, OpenMode::OpenOnly, 0o600).err(),
        Some(Error::NotFound)
    );
    assert_eq!(destroy_ipc_mutex(&name).err(), Some(Error::NotFound));
}

#[test]
fn lock_guards_bytes_across_threads() {
    let mutex_name = unique_name("handoff");
    let data_name = unique_name("handoff_data");
    let _ = destroy_ipc_mutex(&mutex_name);
    let _ = destroy_memory_object(&data_name);

    let mutex = IpcMutex::new(&mutex_name, OpenMode::CreateOnly, 0o600).expect("create mutex");
    let (obj, _) =
        MemoryObject::create_or_open(&data_name, OpenMode::CreateOnly, AccessMode::ReadWrite, 0o600)
            .expect("create data");
    obj.truncate(64).expect("truncate");
    let region = MemoryRegion::new(&obj, AccessMode::ReadWrite, 0, 64).expect("map");

    mutex.lock();
    unsafe { region.as_mut_ptr().write(0xAB) };
    mutex.unlock();

    let mutex_name_t = mutex_name.clone();
    let data_name_t = data_name.clone();
    let t = thread::spawn(move || {
        let mutex = IpcMutex::new(&mutex_name_t, OpenMode::OpenOnly, 0o600).expect("open mutex");
        let (obj, _) = MemoryObject::create_or_open(
            &data_name_t,
            OpenMode::OpenOnly,
            AccessMode::ReadOnly,
            0o600,
        )
        .expect("open data");
        let region = MemoryRegion::new(&obj, AccessMode::ReadOnly, 0, 64).expect("map");
        mutex.lock();
        let byte = region.data()[0];
        mutex.unlock();
        byte
    });

    assert_eq!(t.join().unwrap(), 0xAB);

    mutex.destroy().expect("destroy mutex");
    obj.destroy().expect("destroy data");
}

#[test]
fn scoped_access_locks_for_its_lifetime() {
    let mutex_name = unique_name("scoped");
    let data_name = unique_name("scoped_data");
    let _ = destroy_ipc_mutex(&mutex_name);
    let _ = destroy_memory_object(&data_name);

    let mutex = IpcMutex::new(&mutex_name, OpenMode::CreateOnly, 0o600).expect("create mutex");
    let (obj, _) =
        MemoryObject::create_or_open(&data_name, OpenMode::CreateOnly, AccessMode::ReadWrite, 0o600)
            .expect("create data");
    obj.truncate(32).expect("truncate");
    let region = MemoryRegion::new(&obj, AccessMode::ReadWrite, 0, 32).expect("map");

    {
        let access = ScopedAccess::new(&region, &mutex);
        access.write(b"guarded").expect("write");
        assert_eq!(&access.read()[..7], b"guarded");
        // Held for the guard's lifetime.
        assert!(!mutex.try_lock());
    }

    // Released on drop.
    assert!(mutex.try_lock());
    mutex.unlock();

    let oversized = vec![0u8; 33];
    let access = ScopedAccess::new(&region, &mutex);
    assert!(matches!(
        access.write(&oversized),
        Err(Error::InvalidArgument(_))
    ));
    drop(access);

    mutex.destroy().expect("destroy mutex");
    obj.destroy().expect("destroy data");
}
