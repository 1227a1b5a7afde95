//! Utility functions shared across the engine.

pub mod identifier;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read guard, recovering from a poisoned lock
///
/// A panicking writer never leaves engine state half-updated (state is
/// swapped in whole), so the data behind a poisoned lock is still consistent.
pub(crate) fn read_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!(lock = name, "lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Acquire a write guard, recovering from a poisoned lock
pub(crate) fn write_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!(lock = name, "lock poisoned, recovering");
        poisoned.into_inner()
    })
}
