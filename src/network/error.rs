//! Transport error vocabulary shared with network-loop drivers.

use core::fmt;

/// What went wrong in a driver's I/O pass or connect attempt.
///
/// The loop core never inspects these beyond logging them; whether a failure
/// ends the worker is decided by the driver when it wraps the value in
/// [`LoopError`](super::LoopError).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A timeout occurred.
    Timeout,
    /// The connection was closed by the peer or lost.
    ConnectionClosed,
    /// The peer did not answer within the keepalive interval.
    KeepaliveExpired,
    /// A protocol-specific error occurred.
    ProtocolError,
    /// The pass was abandoned because a forced stop was requested.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::NotOpen => "connection not open",
            Error::WriteError => "write failed",
            Error::ReadError => "read failed",
            Error::ConnectionRefused => "connection refused",
            Error::Timeout => "timed out",
            Error::ConnectionClosed => "connection closed",
            Error::KeepaliveExpired => "keepalive expired",
            Error::ProtocolError => "protocol error",
            Error::Cancelled => "cancelled",
        })
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::KeepaliveExpired => defmt::write!(f, "KeepaliveExpired"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
            Error::Cancelled => defmt::write!(f, "Cancelled"),
        }
    }
}
