//! Common error type for the loop core.

use core::fmt;

/// Errors returned by the lock, clock, wakeup and worker lifecycle operations.
///
/// This enum is deliberately small and `Copy` so it can travel through the
/// `no_std` parts of the crate unchanged. Failures that happen inside the
/// worker thread are never reported through it; see
/// [`LoopError`](crate::network::LoopError) for those.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An unset handle was passed, or the call is forbidden in the current state
    /// (for example starting a worker twice).
    InvalidArgument,
    /// An allocation failed or the OS refused to spawn a thread.
    ResourceExhausted,
    /// A native call failed; carries the raw platform error code.
    OsError(i32),
    /// Threading was requested on a build without threading support.
    Unsupported,
    /// A configuration value was rejected.
    InvalidConfig,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::ResourceExhausted => f.write_str("resource exhausted"),
            Error::OsError(code) => write!(f, "os error {code}"),
            Error::Unsupported => f.write_str("not supported by this build"),
            Error::InvalidConfig => f.write_str("invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Error::OsError(code),
            None if err.kind() == std::io::ErrorKind::OutOfMemory => Error::ResourceExhausted,
            None => Error::OsError(0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Error::ResourceExhausted => defmt::write!(f, "ResourceExhausted"),
            Error::OsError(code) => defmt::write!(f, "OsError({=i32})", code),
            Error::Unsupported => defmt::write!(f, "Unsupported"),
            Error::InvalidConfig => defmt::write!(f, "InvalidConfig"),
        }
    }
}
