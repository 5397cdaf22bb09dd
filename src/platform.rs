//! Platform capability probe.
//!
//! The lock and clock layers pick an implementation once, from the
//! capabilities reported here, and never branch on the platform per call.

/// Kind of tick counter the platform provides.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TickCounter {
    /// A native 64-bit monotonic counter.
    Native64,
    /// Only a 32-bit millisecond counter that wraps roughly every 49.7 days.
    Rolling32,
    /// No monotonic counter at all; wall-clock seconds are used instead.
    None,
}

/// What the running platform offers to the lock and clock layers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Capabilities {
    /// Whether a native reader/writer lock is available.
    pub native_shared_lock: bool,
    /// Which tick counter backs the monotonic clock.
    pub tick_counter: TickCounter,
}

impl Capabilities {
    /// Every native primitive is present.
    pub const NATIVE: Capabilities = Capabilities {
        native_shared_lock: true,
        tick_counter: TickCounter::Native64,
    };

    /// An older platform: no reader/writer lock, only a 32-bit tick counter.
    pub const LEGACY: Capabilities = Capabilities {
        native_shared_lock: false,
        tick_counter: TickCounter::Rolling32,
    };

    /// Probes the current build.
    ///
    /// Hosted targets always provide the native primitives. The
    /// `compat-fallback` feature reports [`Capabilities::LEGACY`] so the
    /// fallback strategies can be exercised on any host.
    pub const fn detect() -> Self {
        if cfg!(feature = "compat-fallback") {
            Self::LEGACY
        } else if cfg!(feature = "std") {
            Self::NATIVE
        } else {
            Capabilities {
                native_shared_lock: false,
                tick_counter: TickCounter::None,
            }
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

impl core::fmt::Display for TickCounter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            TickCounter::Native64 => "native64",
            TickCounter::Rolling32 => "rolling32",
            TickCounter::None => "wall-clock",
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TickCounter {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TickCounter::Native64 => defmt::write!(f, "Native64"),
            TickCounter::Rolling32 => defmt::write!(f, "Rolling32"),
            TickCounter::None => defmt::write!(f, "None"),
        }
    }
}
