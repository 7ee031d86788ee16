// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// POSIX shared memory and mapping primitives: shm_open / shm_unlink /
// ftruncate / fstat / mmap / munmap / msync / page size.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::shm::AccessMode;

fn c_name(posix_name: &str) -> Result<CString> {
    CString::new(posix_name.as_bytes())
        .map_err(|_| Error::InvalidArgument("name contains an interior NUL".to_string()))
}

/// One shm_open attempt. `create_excl` selects `O_CREAT|O_EXCL`; otherwise
/// the call opens an existing object. The open-or-create retry dance lives
/// in the memory-object layer, not here.
pub(crate) fn shm_open_once(
    posix_name: &str,
    create_excl: bool,
    access: AccessMode,
    perm: u32,
) -> Result<RawFd> {
    let c_name = c_name(posix_name)?;
    let mut oflag = match access {
        AccessMode::ReadOnly => libc::O_RDONLY,
        AccessMode::ReadWrite => libc::O_RDWR,
    };
    if create_excl {
        oflag |= libc::O_CREAT | libc::O_EXCL;
    }
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, perm as libc::c_uint) };
    if fd == -1 {
        return Err(Error::last_os_error());
    }
    if create_excl {
        // The umask may have masked bits out of the creation mode; restore
        // the exact bits the caller asked for.
        unsafe { libc::fchmod(fd, perm as libc::mode_t) };
    }
    Ok(fd)
}

/// Remove a name from the kernel namespace. The bytes survive for holders
/// that still have the object mapped.
pub(crate) fn shm_unlink(posix_name: &str) -> Result<()> {
    let c_name = c_name(posix_name)?;
    let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub(crate) fn ftruncate(fd: RawFd, size: u64) -> Result<()> {
    let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn fstat_size(fd: RawFd) -> Result<u64> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::fstat(fd, &mut st) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(st.st_size as u64)
}

/// Map `size` bytes of `fd` at `offset`. The caller is responsible for
/// page-aligning `offset` (the region layer does the fixup).
pub(crate) fn mmap(fd: RawFd, access: AccessMode, offset: i64, size: usize) -> Result<*mut u8> {
    let prot = match access {
        AccessMode::ReadOnly => libc::PROT_READ,
        AccessMode::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    };
    let mem = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            prot,
            libc::MAP_SHARED,
            fd,
            offset as libc::off_t,
        )
    };
    if mem == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    Ok(mem as *mut u8)
}

pub(crate) fn munmap(ptr: *mut u8, size: usize) {
    unsafe { libc::munmap(ptr as *mut libc::c_void, size) };
}

/// Best-effort write-back of a mapped range. No durability is promised for
/// POSIX shm objects; this exists for file-backed mappings.
pub(crate) fn msync(ptr: *mut u8, size: usize, async_flush: bool) -> Result<()> {
    let flags = if async_flush {
        libc::MS_ASYNC
    } else {
        libc::MS_SYNC
    };
    let ret = unsafe { libc::msync(ptr as *mut libc::c_void, size, flags) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}
