//! Exclusive/shared lock with a native fast path and a fallback path.
//!
//! [`MutexHandle`] mirrors the classic handle-based lock API: it starts out
//! unset, is initialized once per client, and every operation on an unset
//! handle fails with [`Error::InvalidArgument`]. Which implementation backs
//! the handle is decided once per [`LockLibrary`], never per call:
//!
//! * **Native**: a reader/writer lock. Shared holders overlap with each other
//!   and never with an exclusive holder.
//! * **Fallback**: for platforms without a native reader/writer lock. `init`
//!   allocates an exclusive-only lock on the heap and shared acquisitions
//!   degrade to exclusive ones. Correctness is preserved, concurrency is not.
//!
//! [`Guarded`] pairs the same lock with data and hands out RAII guards.

mod guarded;

pub use guarded::{Guarded, ReadGuard, WriteGuard};

use crate::error::Error;
use crate::once::SingleFlight;
use crate::platform::Capabilities;
use parking_lot::lock_api::{RawMutex as _, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock};
use std::boxed::Box;
use std::vec::Vec;

/// Which lock implementation a [`LockLibrary`] hands out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockStrategy {
    /// Native reader/writer lock.
    Native,
    /// Heap-allocated exclusive-only lock; shared access is exclusive.
    Fallback,
}

#[cfg(feature = "defmt")]
impl defmt::Format for LockStrategy {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LockStrategy::Native => defmt::write!(f, "Native"),
            LockStrategy::Fallback => defmt::write!(f, "Fallback"),
        }
    }
}

impl core::fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            LockStrategy::Native => "native",
            LockStrategy::Fallback => "fallback",
        })
    }
}

/// Lazily resolved lock strategy.
///
/// The process-wide instance is [`LockLibrary::global`]. Tests and embedders
/// that want hermetic behavior build their own with
/// [`LockLibrary::with_capabilities`]. A library lives as long as its owner;
/// the global one is never torn down.
#[derive(Debug)]
pub struct LockLibrary {
    capabilities: Option<Capabilities>,
    strategy: SingleFlight<LockStrategy>,
}

static GLOBAL: LockLibrary = LockLibrary::new();

impl LockLibrary {
    /// A library that probes the platform on first use.
    pub const fn new() -> Self {
        Self {
            capabilities: None,
            strategy: SingleFlight::new(),
        }
    }

    /// A library that resolves its strategy from `capabilities` instead of
    /// probing the platform.
    pub const fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities: Some(capabilities),
            strategy: SingleFlight::new(),
        }
    }

    /// The process-wide library.
    pub fn global() -> &'static LockLibrary {
        &GLOBAL
    }

    /// Resolves the strategy, once. Later calls return the cached answer.
    pub fn init(&self) -> LockStrategy {
        *self.strategy.get_or_init(|| {
            let caps = self.capabilities.unwrap_or_else(Capabilities::detect);
            let strategy = if caps.native_shared_lock {
                LockStrategy::Native
            } else {
                LockStrategy::Fallback
            };
            crate::trace::debug!("lock strategy selected: {}", strategy);
            strategy
        })
    }
}

impl Default for LockLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// The lock behind a handle.
pub(crate) enum RawLock {
    Native(RawRwLock),
    Fallback(HeapLock),
}

impl RawLock {
    pub(crate) fn new(library: &LockLibrary) -> Result<Self, Error> {
        Ok(match library.init() {
            LockStrategy::Native => RawLock::Native(RawRwLock::INIT),
            LockStrategy::Fallback => RawLock::Fallback(HeapLock::new()?),
        })
    }

    fn strategy(&self) -> LockStrategy {
        match self {
            RawLock::Native(_) => LockStrategy::Native,
            RawLock::Fallback(_) => LockStrategy::Fallback,
        }
    }

    pub(crate) fn lock_exclusive(&self) {
        match self {
            RawLock::Native(lock) => lock.lock_exclusive(),
            RawLock::Fallback(lock) => lock.raw().lock(),
        }
    }

    pub(crate) fn try_lock_exclusive(&self) -> bool {
        match self {
            RawLock::Native(lock) => lock.try_lock_exclusive(),
            RawLock::Fallback(lock) => lock.raw().try_lock(),
        }
    }

    /// # Safety
    ///
    /// The caller must hold the lock exclusively.
    pub(crate) unsafe fn unlock_exclusive(&self) {
        match self {
            RawLock::Native(lock) => unsafe { lock.unlock_exclusive() },
            RawLock::Fallback(lock) => unsafe { lock.raw().unlock() },
        }
    }

    pub(crate) fn lock_shared(&self) {
        match self {
            RawLock::Native(lock) => lock.lock_shared(),
            RawLock::Fallback(lock) => lock.raw().lock(),
        }
    }

    /// # Safety
    ///
    /// The caller must hold a shared acquisition of the lock.
    pub(crate) unsafe fn unlock_shared(&self) {
        match self {
            RawLock::Native(lock) => unsafe { lock.unlock_shared() },
            RawLock::Fallback(lock) => unsafe { lock.raw().unlock() },
        }
    }

    fn is_locked(&self) -> bool {
        match self {
            RawLock::Native(lock) => lock.is_locked(),
            RawLock::Fallback(lock) => lock.raw().is_locked(),
        }
    }
}

/// Exclusive-only lock on the heap, allocated fallibly.
pub(crate) struct HeapLock(Box<[RawMutex]>);

impl HeapLock {
    fn new() -> Result<Self, Error> {
        let mut slot = Vec::new();
        slot.try_reserve_exact(1).map_err(|_| Error::ResourceExhausted)?;
        slot.push(RawMutex::INIT);
        Ok(HeapLock(slot.into_boxed_slice()))
    }

    fn raw(&self) -> &RawMutex {
        &self.0[0]
    }
}

/// Handle-based exclusive/shared lock.
///
/// Create it with [`MutexHandle::new`] (or [`unset`](MutexHandle::unset)
/// followed by [`init`](MutexHandle::init)), tear it down with
/// [`destroy`](MutexHandle::destroy). The raw release calls are `unsafe`
/// because releasing a lock the caller does not hold is undefined; prefer
/// [`lock`](MutexHandle::lock) and [`lock_shared`](MutexHandle::lock_shared)
/// which release on drop.
pub struct MutexHandle {
    lock: Option<RawLock>,
}

impl MutexHandle {
    /// A handle with no lock behind it.
    pub const fn unset() -> Self {
        Self { lock: None }
    }

    /// A handle initialized from the process-wide library.
    pub fn new() -> Result<Self, Error> {
        Self::with_library(LockLibrary::global())
    }

    /// A handle initialized from `library`.
    pub fn with_library(library: &LockLibrary) -> Result<Self, Error> {
        let mut handle = Self::unset();
        handle.init(library)?;
        Ok(handle)
    }

    /// Initializes an unset handle.
    ///
    /// With the fallback strategy this allocates; allocation failure is
    /// reported as [`Error::ResourceExhausted`]. Initializing a handle that is
    /// already set is rejected.
    pub fn init(&mut self, library: &LockLibrary) -> Result<(), Error> {
        if self.lock.is_some() {
            return Err(Error::InvalidArgument);
        }
        self.lock = Some(RawLock::new(library)?);
        Ok(())
    }

    /// Releases the lock's resources and leaves the handle unset.
    ///
    /// Destroying an unset handle is a no-op. A handle that is currently held
    /// is refused with [`Error::InvalidArgument`].
    pub fn destroy(&mut self) -> Result<(), Error> {
        match &self.lock {
            None => Ok(()),
            Some(lock) if lock.is_locked() => Err(Error::InvalidArgument),
            Some(_) => {
                self.lock = None;
                Ok(())
            }
        }
    }

    /// Whether the handle has been initialized and not destroyed.
    pub fn is_set(&self) -> bool {
        self.lock.is_some()
    }

    /// Strategy backing this handle, if set.
    pub fn strategy(&self) -> Option<LockStrategy> {
        self.lock.as_ref().map(RawLock::strategy)
    }

    fn raw(&self) -> Result<&RawLock, Error> {
        self.lock.as_ref().ok_or(Error::InvalidArgument)
    }

    /// Blocks until the lock is held exclusively.
    pub fn acquire_exclusive(&self) -> Result<(), Error> {
        self.raw()?.lock_exclusive();
        Ok(())
    }

    /// Takes the lock exclusively if nobody holds it.
    pub fn try_acquire_exclusive(&self) -> Result<bool, Error> {
        Ok(self.raw()?.try_lock_exclusive())
    }

    /// Releases an exclusive acquisition.
    ///
    /// # Safety
    ///
    /// The calling context must hold the lock exclusively.
    pub unsafe fn release_exclusive(&self) -> Result<(), Error> {
        let lock = self.raw()?;
        // SAFETY: forwarded to the caller.
        unsafe { lock.unlock_exclusive() };
        Ok(())
    }

    /// Blocks until a shared acquisition is granted.
    ///
    /// With the fallback strategy this is an exclusive acquisition.
    pub fn acquire_shared(&self) -> Result<(), Error> {
        self.raw()?.lock_shared();
        Ok(())
    }

    /// Releases a shared acquisition.
    ///
    /// # Safety
    ///
    /// The calling context must hold a shared acquisition of the lock.
    pub unsafe fn release_shared(&self) -> Result<(), Error> {
        let lock = self.raw()?;
        // SAFETY: forwarded to the caller.
        unsafe { lock.unlock_shared() };
        Ok(())
    }

    /// Acquires exclusively and returns a guard that releases on drop.
    pub fn lock(&self) -> Result<ExclusiveGuard<'_>, Error> {
        let lock = self.raw()?;
        lock.lock_exclusive();
        Ok(ExclusiveGuard { lock })
    }

    /// Acquires shared and returns a guard that releases on drop.
    pub fn lock_shared(&self) -> Result<SharedGuard<'_>, Error> {
        let lock = self.raw()?;
        lock.lock_shared();
        Ok(SharedGuard { lock })
    }
}

impl core::fmt::Debug for MutexHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MutexHandle")
            .field("strategy", &self.strategy())
            .finish()
    }
}

/// Exclusive acquisition of a [`MutexHandle`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    lock: &'a RawLock,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while the exclusive acquisition is held.
        unsafe { self.lock.unlock_exclusive() }
    }
}

impl core::fmt::Debug for ExclusiveGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ExclusiveGuard")
    }
}

/// Shared acquisition of a [`MutexHandle`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedGuard<'a> {
    lock: &'a RawLock,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while the shared acquisition is held.
        unsafe { self.lock.unlock_shared() }
    }
}

impl core::fmt::Debug for SharedGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedGuard")
    }
}
