// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Cross-process IPC primitives over named shared memory: kernel-persistent
// memory objects, page-fixed mapped regions, and mutexes whose entire
// state lives inside the mapping (futex-parked where the OS has a futex,
// SysV-semaphore-parked or spinning where it does not).

pub mod object_name;

mod platform;

mod error;
pub use error::{Error, Result};

mod shm;
pub use shm::{destroy_memory_object, AccessMode, MemoryObject, OpenMode};

mod region;
pub use region::{MemoryRegion, RegionReader, RegionWriter};

mod wait_waker;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use wait_waker::FutexWaitWaker;
pub use wait_waker::{SemWaitWaker, SpinWaitWaker, WaitWaker};

mod inplace_mutex;
pub use inplace_mutex::{InplaceMutex, INPLACE_MUTEX_SIZE};

mod mutex;
pub use mutex::{destroy_ipc_mutex, IpcMutex};

mod spin_mutex;
pub use spin_mutex::{destroy_spin_mutex, SpinMutex, SPIN_MUTEX_SIZE};

mod scoped_access;
pub use scoped_access::ScopedAccess;
