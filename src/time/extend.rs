//! Software extension of a wrapping 32-bit tick counter to 64 bits.

use core::sync::atomic::{AtomicU64, Ordering};

/// A 32-bit millisecond counter that wraps to zero, like `GetTickCount`.
pub trait RollingCounter {
    /// Reads the current counter value.
    fn read(&self) -> u32;
}

impl<F: Fn() -> u32> RollingCounter for F {
    #[inline]
    fn read(&self) -> u32 {
        self()
    }
}

/// Extends a [`RollingCounter`] to a 64-bit value that never goes backward.
///
/// Every read computes the delta between the raw counter and the low 32 bits
/// of the last published value and publishes the sum with a compare-exchange.
/// A losing writer re-reads instead of overwriting a newer value. The counter
/// must be read at least once per 2^31 ticks (about 24.8 days at 1 ms) for
/// the delta to stay unambiguous.
#[derive(Debug)]
pub struct Extended32<C> {
    counter: C,
    ticks64: AtomicU64,
}

impl<C: RollingCounter> Extended32<C> {
    /// Wraps `counter`, seeding the extension with its current value.
    pub fn new(counter: C) -> Self {
        let seed = counter.read();
        Self {
            counter,
            ticks64: AtomicU64::new(u64::from(seed)),
        }
    }

    /// Returns the extended 64-bit tick value.
    pub fn read(&self) -> u64 {
        loop {
            let old = self.ticks64.load(Ordering::Acquire);
            let raw = self.counter.read();
            let step = match extension_step(raw, old as u32) {
                Some(0) | None => return old,
                Some(step) => step,
            };
            let new = old + step;
            match self
                .ticks64
                .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return new,
                Err(current) if current >= new => return current,
                Err(_) => continue,
            }
        }
    }

    /// Returns the last published value without touching the counter.
    pub fn last(&self) -> u64 {
        self.ticks64.load(Ordering::Acquire)
    }
}

/// Forward distance from `low` to `raw`, or `None` if `raw` is behind `low`.
///
/// A signed delta under 2^31 is taken as is. A delta below `i32::MIN / 2`
/// means the counter wrapped past the signed range and is reinterpreted as
/// unsigned. Anything in between is a read that raced a newer publish.
fn extension_step(raw: u32, low: u32) -> Option<u64> {
    let delta = raw.wrapping_sub(low) as i32;
    if delta >= 0 {
        Some(delta as u64)
    } else if delta < i32::MIN / 2 {
        Some(u64::from(delta as u32))
    } else {
        None
    }
}
