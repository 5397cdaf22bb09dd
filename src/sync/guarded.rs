//! Data protected by a strategy-selected lock.

use super::{LockLibrary, RawLock};
use crate::error::Error;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

/// A value behind the same exclusive/shared lock as [`MutexHandle`](super::MutexHandle).
///
/// The lock is always initialized, so acquiring never fails once the cell
/// exists. Read guards share the lock, write guards hold it exclusively; with
/// the fallback strategy both are exclusive.
pub struct Guarded<T> {
    lock: RawLock,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is mediated by `lock`. Write guards give `&mut T`
// to one thread at a time (needs `Send`); read guards may hand `&T` to several
// threads at once (needs `Sync`).
unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send + Sync> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    /// Wraps `value` using the process-wide lock library.
    pub fn new(value: T) -> Result<Self, Error> {
        Self::with_library(value, LockLibrary::global())
    }

    /// Wraps `value` using `library` to pick the lock.
    pub fn with_library(value: T, library: &LockLibrary) -> Result<Self, Error> {
        Ok(Self {
            lock: RawLock::new(library)?,
            value: UnsafeCell::new(value),
        })
    }

    /// Exclusive access.
    pub fn write(&self) -> WriteGuard<'_, T> {
        self.lock.lock_exclusive();
        WriteGuard { cell: self }
    }

    /// Exclusive access if nobody holds the lock right now.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        if self.lock.try_lock_exclusive() {
            Some(WriteGuard { cell: self })
        } else {
            None
        }
    }

    /// Shared access.
    pub fn read(&self) -> ReadGuard<'_, T> {
        self.lock.lock_shared();
        ReadGuard { cell: self }
    }

    /// Mutable access through a unique borrow; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the cell and returns the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.try_write() {
            Some(guard) => f.debug_struct("Guarded").field("value", &*guard).finish(),
            None => f.debug_struct("Guarded").field("value", &"<locked>").finish(),
        }
    }
}

/// Exclusive access to a [`Guarded`] value.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T> {
    cell: &'a Guarded<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the exclusive lock is held for the guard's lifetime.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the exclusive lock is held for the guard's lifetime.
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: acquired exclusively in `write`/`try_write`.
        unsafe { self.cell.lock.unlock_exclusive() }
    }
}

/// Shared access to a [`Guarded`] value.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T> {
    cell: &'a Guarded<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a shared acquisition is held for the guard's lifetime.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: acquired shared in `read`.
        unsafe { self.cell.lock.unlock_shared() }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&**self, f)
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&**self, f)
    }
}
