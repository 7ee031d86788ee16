// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Mapped byte windows over memory objects. The mapping itself is always
// page-aligned; the user-visible window starts at the requested offset via
// an internal fixup. Reader/writer views hold a strong reference to the
// region so bytes handed out through them can never outlive the mapping.

use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::platform::posix;
use crate::shm::AccessMode;

/// A process-local mapping of (a window of) a memory object.
///
/// The region exclusively owns its mapping and unmaps on drop. Anything
/// that hands region bytes to code outliving the current borrow should go
/// through [`RegionReader`] / [`RegionWriter`], which keep the region alive.
pub struct MemoryRegion {
    base: *mut u8, // mmap base, page-aligned
    total: usize,  // mapped length = delta + size
    delta: usize,  // offset fixup below the user window
    size: usize,   // user-visible length
    access: AccessMode,
}

// The mapping is process-shared by design; synchronization of the bytes is
// the caller's business (that is what the mutexes are for).
unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    /// Map `size` bytes of `object` starting at `offset`.
    ///
    /// `offset` need not be page-aligned; the platform is invoked with an
    /// aligned pair and the fixup is hidden. A `size` of zero maps from
    /// `offset` to the object's current end, which requires a statable,
    /// non-empty object.
    pub fn new<F: AsRawFd>(object: &F, access: AccessMode, offset: i64, size: usize) -> Result<Self> {
        if offset < 0 {
            return Err(Error::InvalidArgument("negative offset".to_string()));
        }
        let fd = object.as_raw_fd();
        if fd < 0 {
            return Err(Error::InvalidArgument("invalid file descriptor".to_string()));
        }

        let size = if size == 0 {
            let object_size = posix::fstat_size(fd)?;
            if offset as u64 >= object_size {
                return Err(Error::InvalidArgument(format!(
                    "offset {offset} is at or past the object end {object_size}"
                )));
            }
            (object_size - offset as u64) as usize
        } else {
            size
        };

        let pg = posix::page_size() as i64;
        let delta = (offset % pg) as usize;
        let aligned_offset = offset - delta as i64;
        let total = size + delta;

        let base = posix::mmap(fd, access, aligned_offset, total)?;
        trace!(offset, size, delta, "region mapped");
        Ok(Self {
            base,
            total,
            delta,
            size,
            access,
        })
    }

    /// The user-visible bytes, beginning exactly at the requested offset.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Pointer to the start of the user-visible window.
    pub fn as_ptr(&self) -> *const u8 {
        unsafe { self.base.add(self.delta) }
    }

    /// Mutable pointer to the start of the user-visible window.
    ///
    /// Writing through this on a read-only mapping faults; use
    /// [`RegionWriter`] for checked access.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        unsafe { self.base.add(self.delta) }
    }

    /// User-visible length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The access mode the region was mapped with.
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Best-effort write-back of the mapped range.
    ///
    /// For POSIX shm objects this promises nothing about durability; it
    /// exists for file-backed mappings.
    pub fn flush(&self, async_flush: bool) -> Result<()> {
        posix::msync(self.base, self.total, async_flush)
    }

    /// Tear down the mapping now instead of at end of scope.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        trace!(size = self.size, "region unmapped");
        posix::munmap(self.base, self.total);
    }
}

/// A positional reader over a region.
///
/// Owns a strong reference to the region, so the mapping stays alive for
/// as long as the reader does — even after every other handle is dropped.
pub struct RegionReader {
    region: Arc<MemoryRegion>,
    pos: u64,
}

impl RegionReader {
    pub fn new(region: Arc<MemoryRegion>) -> Self {
        Self { region, pos: 0 }
    }

    /// Copy bytes at `offset` into `buf` without touching the cursor.
    /// Returns the number copied; zero when `offset` is past the end.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let data = self.region.data();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    /// The region backing this reader.
    pub fn region(&self) -> &Arc<MemoryRegion> {
        &self.region
    }
}

impl io::Read for RegionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = (self.pos as usize).min(self.region.size());
        let n = self.read_at(buf, pos);
        self.pos += n as u64;
        Ok(n)
    }
}

impl io::Seek for RegionReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let size = self.region.size() as i64;
        let target = match pos {
            io::SeekFrom::Start(n) => n as i64,
            io::SeekFrom::End(n) => size + n,
            io::SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of region",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

/// A positional writer over a read-write region.
///
/// Like [`RegionReader`], holds a strong reference to the region. Writes
/// past the region end are clipped: `write_at` returns the short count.
pub struct RegionWriter {
    region: Arc<MemoryRegion>,
    pos: u64,
}

impl RegionWriter {
    /// Fails with `PermissionDenied` if the region is mapped read-only.
    pub fn new(region: Arc<MemoryRegion>) -> Result<Self> {
        if region.access() == AccessMode::ReadOnly {
            return Err(Error::PermissionDenied);
        }
        Ok(Self { region, pos: 0 })
    }

    /// Copy as much of `buf` as fits starting at `offset`. Returns the
    /// number of bytes written; zero when `offset` is past the end.
    pub fn write_at(&mut self, buf: &[u8], offset: usize) -> usize {
        let size = self.region.size();
        if offset >= size {
            return 0;
        }
        let n = buf.len().min(size - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), self.region.as_mut_ptr().add(offset), n);
        }
        n
    }

    /// The region backing this writer.
    pub fn region(&self) -> &Arc<MemoryRegion> {
        &self.region
    }
}

impl io::Write for RegionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pos = (self.pos as usize).min(self.region.size());
        let n = self.write_at(buf, pos);
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.region.flush(false).map_err(io::Error::other)
    }
}
