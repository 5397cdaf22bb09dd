//! Single-flight initialization.
//!
//! Process-wide state in this crate (lock strategy selection, the clock
//! source) is probed lazily on first use. Exactly one caller runs the probe;
//! every other caller that arrives meanwhile spins until the winner publishes
//! the result. The guard is a three-valued atomic:
//!
//! ```text
//! UNTOUCHED --cas--> IN_PROGRESS --store--> DONE
//! ```
//!
//! Only `core` atomics are used so the guard is available without `std`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const UNTOUCHED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Three-state atomic guard for one-time initialization.
#[derive(Debug)]
pub struct InitGuard {
    state: AtomicU8,
}

impl InitGuard {
    /// Creates a guard in the untouched state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNTOUCHED),
        }
    }

    /// Returns `true` once the winning initializer has published.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    /// Runs `init` exactly once across all callers.
    ///
    /// Returns `true` for the caller whose closure ran. Losers of the race
    /// return `false` only after the winner has finished, so anything the
    /// winner wrote is visible to them.
    pub fn call_once<F: FnOnce()>(&self, init: F) -> bool {
        if self.is_done() {
            return false;
        }
        match self
            .state
            .compare_exchange(UNTOUCHED, IN_PROGRESS, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                init();
                self.state.store(DONE, Ordering::Release);
                true
            }
            Err(_) => {
                while self.state.load(Ordering::Acquire) != DONE {
                    relax();
                }
                false
            }
        }
    }
}

impl Default for InitGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
#[inline]
fn relax() {
    std::thread::yield_now();
}

#[cfg(not(feature = "std"))]
#[inline]
fn relax() {
    core::hint::spin_loop();
}

/// A value computed once, on first access, under an [`InitGuard`].
///
/// Usable in `static` position; see [`SingleFlight::get_or_init`].
pub struct SingleFlight<T> {
    guard: InitGuard,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: the value is written once by the guard winner before `DONE` is
// published with release ordering and only read after observing `DONE` with
// acquire ordering. Shared access afterwards is read-only.
unsafe impl<T: Send + Sync> Sync for SingleFlight<T> {}
unsafe impl<T: Send> Send for SingleFlight<T> {}

impl<T> SingleFlight<T> {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self {
            guard: InitGuard::new(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Creates a cell that is already initialized with `value`.
    pub fn with_value(value: T) -> Self {
        let cell = Self::new();
        cell.guard.call_once(|| {
            // SAFETY: the guard was untouched, so no reader can exist yet.
            unsafe { (*cell.value.get()).write(value) };
        });
        cell
    }

    /// Returns the value, running `init` if no caller has yet.
    pub fn get_or_init<F: FnOnce() -> T>(&self, init: F) -> &T {
        self.guard.call_once(|| {
            // SAFETY: only the single guard winner reaches this write, and no
            // reader dereferences the slot before `DONE` is published.
            unsafe { (*self.value.get()).write(init()) };
        });
        // SAFETY: `call_once` returns only after `DONE`, which implies the
        // slot was written.
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    /// Returns the value if it has been initialized.
    pub fn get(&self) -> Option<&T> {
        if self.guard.is_done() {
            // SAFETY: `DONE` implies the slot was written.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SingleFlight<T> {
    fn drop(&mut self) {
        if self.guard.is_done() {
            // SAFETY: `DONE` implies the slot holds a live value and `&mut self`
            // rules out concurrent readers.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("SingleFlight").field(&self.get()).finish()
    }
}
