// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 memipc contributors
//
// Object-name validation and POSIX shm naming.
// Named primitives namespace their backing objects with a fixed prefix so
// that a mutex and a queue with the same user name never collide.

use crate::error::{Error, Result};

/// Maximum accepted length for a user-supplied object name, in bytes.
/// Some platforms enforce tighter limits (macOS caps shm names at 31
/// bytes); those surface as `NameTooLong` from the open call itself.
pub const NAME_MAX: usize = 255;

/// Namespace prefix for named in-place mutexes.
pub const MUTEX_PREFIX: &str = "mutex.";

/// Namespace prefix for named spin mutexes.
pub const SPIN_PREFIX: &str = "spin.";

/// Namespace prefix for named semaphores (reserved for collaborators).
pub const SEM_PREFIX: &str = "sem.";

/// Namespace prefix for named message queues (reserved for collaborators).
pub const MQ_PREFIX: &str = "mq.";

/// Check a user-supplied object name against the platform rules:
/// non-empty, no path separators, at most [`NAME_MAX`] bytes.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("name is empty".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidArgument(
            "name must not contain '/'".to_string(),
        ));
    }
    if name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

/// The POSIX shm form of a (validated, prefixed) name: a leading '/'
/// followed by the name itself.
pub(crate) fn make_posix_name(name: &str) -> String {
    format!("/{name}")
}
