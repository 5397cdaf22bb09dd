//! Logging shims.
//!
//! With the `defmt` feature the macros forward to `defmt`, otherwise with the
//! `tracing` feature they forward to `tracing`. Without either they expand to
//! nothing, though arguments are still type-checked. Call sites only use
//! positional `{}` arguments so both backends accept the same format strings.

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(any(feature = "defmt", feature = "tracing")))]
macro_rules! noop {
    ($($arg:tt)*) => {{
        if false {
            let _ = core::format_args!($($arg)*);
        }
    }};
}

#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[allow(unused_imports)]
pub(crate) use noop as debug;
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[allow(unused_imports)]
pub(crate) use noop as error;
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[allow(unused_imports)]
pub(crate) use noop as info;
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[allow(unused_imports)]
pub(crate) use noop as trace;
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[allow(unused_imports)]
pub(crate) use noop as warn;
