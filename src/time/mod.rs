//! Monotonic clock for keepalive and retry scheduling.
//!
//! [`now`] returns a value that only moves forward and ignores wall-clock
//! adjustments (NTP slews, DST). The backing source is picked once per
//! process from [`Capabilities`](crate::platform::Capabilities):
//!
//! * a native 64-bit monotonic counter when available,
//! * a 32-bit rolling millisecond counter extended in software
//!   (see [`Extended32`]) on platforms that only have that,
//! * wall-clock seconds as a degraded last resort. Precision drops to a
//!   second and the value is clamped so it still never decreases.
//!
//! Independent clocks can be built with [`Clock::new`] and friends; only
//! [`Clock::global`] is process-wide.

mod extend;

pub use extend::{Extended32, RollingCounter};

/// Elapsed time in milliseconds since an arbitrary epoch.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Ticks(u64);

impl Ticks {
    /// Creates a tick value from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Milliseconds since the clock's epoch.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Whole seconds since the clock's epoch.
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is later.
    pub const fn millis_since(self, earlier: Ticks) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Ticks {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=u64}ms", self.0)
    }
}

#[cfg(feature = "std")]
pub use self::hosted::{Clock, ClockSource, now};

#[cfg(feature = "std")]
mod hosted {
    use super::{Extended32, Ticks};
    use crate::once::SingleFlight;
    use crate::platform::{Capabilities, TickCounter};
    use std::boxed::Box;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Instant, SystemTime, UNIX_EPOCH};

    type BoxedCounter = Box<dyn Fn() -> u32 + Send + Sync>;

    /// The strategy a [`Clock`] reads from.
    pub enum ClockSource {
        /// Native monotonic counter, measured from `epoch`.
        Monotonic {
            /// Instant the clock was created.
            epoch: Instant,
        },
        /// Software-extended 32-bit rolling counter.
        Extended(Extended32<BoxedCounter>),
        /// Wall-clock seconds, clamped to never go backward.
        WallClock {
            /// Highest value handed out so far.
            floor: AtomicU64,
        },
    }

    impl core::fmt::Debug for ClockSource {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                ClockSource::Monotonic { epoch } => {
                    f.debug_struct("Monotonic").field("epoch", epoch).finish()
                }
                ClockSource::Extended(ext) => {
                    f.debug_struct("Extended").field("last", &ext.last()).finish()
                }
                ClockSource::WallClock { floor } => f
                    .debug_struct("WallClock")
                    .field("floor", &floor.load(Ordering::Relaxed))
                    .finish(),
            }
        }
    }

    /// A monotonic clock backed by one [`ClockSource`].
    #[derive(Debug)]
    pub struct Clock {
        source: ClockSource,
    }

    static GLOBAL: SingleFlight<Clock> = SingleFlight::new();

    impl Clock {
        /// Builds a clock for the given platform capabilities.
        pub fn new(caps: Capabilities) -> Self {
            match caps.tick_counter {
                TickCounter::Native64 => Self::monotonic(),
                TickCounter::Rolling32 => {
                    let epoch = Instant::now();
                    Self::with_rolling_counter(move || epoch.elapsed().as_millis() as u32)
                }
                TickCounter::None => Self::wall_clock(),
            }
        }

        /// A clock reading the native monotonic counter.
        pub fn monotonic() -> Self {
            Self {
                source: ClockSource::Monotonic {
                    epoch: Instant::now(),
                },
            }
        }

        /// A clock extending a 32-bit millisecond `counter` to 64 bits.
        pub fn with_rolling_counter<F>(counter: F) -> Self
        where
            F: Fn() -> u32 + Send + Sync + 'static,
        {
            Self {
                source: ClockSource::Extended(Extended32::new(Box::new(counter))),
            }
        }

        /// The degraded wall-clock clock.
        pub fn wall_clock() -> Self {
            Self {
                source: ClockSource::WallClock {
                    floor: AtomicU64::new(0),
                },
            }
        }

        /// The process-wide clock, probed on first use.
        ///
        /// Concurrent first callers race on a single-flight guard; exactly one
        /// of them probes the platform and the rest wait for it.
        pub fn global() -> &'static Clock {
            GLOBAL.get_or_init(|| {
                let caps = Capabilities::detect();
                crate::trace::debug!("clock source selected: {}", caps.tick_counter);
                Clock::new(caps)
            })
        }

        /// Current tick value.
        pub fn now(&self) -> Ticks {
            match &self.source {
                ClockSource::Monotonic { epoch } => {
                    Ticks::from_millis(epoch.elapsed().as_millis() as u64)
                }
                ClockSource::Extended(ext) => Ticks::from_millis(ext.read()),
                ClockSource::WallClock { floor } => {
                    let secs = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    let ms = secs.saturating_mul(1000);
                    let prev = floor.fetch_max(ms, Ordering::AcqRel);
                    Ticks::from_millis(prev.max(ms))
                }
            }
        }

        /// Which kind of source backs this clock.
        pub fn counter_kind(&self) -> TickCounter {
            match self.source {
                ClockSource::Monotonic { .. } => TickCounter::Native64,
                ClockSource::Extended(_) => TickCounter::Rolling32,
                ClockSource::WallClock { .. } => TickCounter::None,
            }
        }
    }

    /// Reads the process-wide clock.
    pub fn now() -> Ticks {
        Clock::global().now()
    }
}
