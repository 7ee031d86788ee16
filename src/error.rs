// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Error kinds surfaced by the crate. Platform errno values are translated
// into these kinds at the syscall wrappers; no raw os error crosses the
// public API.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by memory objects, regions and synchronization primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The named object already exists (exclusive create).
    #[error("object already exists")]
    AlreadyExists,

    /// No object with the given name exists.
    #[error("object not found")]
    NotFound,

    /// The caller lacks permission for the requested access.
    #[error("permission denied")]
    PermissionDenied,

    /// A parameter is malformed or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The object name exceeds the platform limit.
    #[error("name too long")]
    NameTooLong,

    /// A timed operation did not complete within its budget.
    #[error("operation timed out")]
    Timeout,

    /// A blocking operation was interrupted by a signal.
    #[error("interrupted by a signal")]
    Interrupted,

    /// The operation cannot proceed right now (futex value mismatch,
    /// semaphore would block). Callers in wait loops treat this as a cue
    /// to re-inspect state, not as a failure.
    #[error("operation would block")]
    WouldBlock,

    /// The platform does not provide the required facility.
    #[error("not supported on this platform")]
    Unsupported,
}

impl Error {
    /// Translate a raw errno into an error kind.
    pub(crate) fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EEXIST => Error::AlreadyExists,
            libc::ENOENT => Error::NotFound,
            libc::EACCES | libc::EPERM => Error::PermissionDenied,
            libc::ENAMETOOLONG => Error::NameTooLong,
            libc::ETIMEDOUT => Error::Timeout,
            libc::EINTR => Error::Interrupted,
            libc::EAGAIN => Error::WouldBlock,
            libc::ENOSYS => Error::Unsupported,
            libc::EINVAL => Error::InvalidArgument("invalid argument".to_string()),
            other => Error::InvalidArgument(format!("unexpected os error {other}")),
        }
    }

    /// The errno left behind by the last failed libc call.
    pub(crate) fn last_os_error() -> Self {
        Self::from_errno(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// Whether this error is the timeout sentinel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
