//! Seams between the loop core and the network-loop driver.
//!
//! The core never touches packets. It consumes a [`NetworkLoop`]: something
//! that can run one bounded wait-and-process pass over the client's socket
//! and re-establish the transport on request. The driver gets a
//! [`LoopContext`] on every call so it can read and advance the connection
//! state, include the [`WakeupChannel`] in its own wait, and notice a forced
//! stop.

#![deny(unsafe_code)]

/// Transport error vocabulary
pub mod error;

/// Self-pipe wakeup channel
pub mod wakeup;

pub use error::Error;
pub use wakeup::{Wake, WakeupChannel};

use crate::client::{Shared, WorkerFlags};
use crate::state::ConnectionState;
use core::fmt;
use core::sync::atomic::Ordering;
use std::time::Duration;

/// A failed driver pass, classified by the driver.
///
/// The core only distinguishes "keep going" from "leave the loop":
/// a recoverable failure is treated as a lost connection and retried per the
/// reconnect policy, a fatal one ends the worker.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LoopError {
    /// The connection is unusable but a reconnect may fix it.
    Recoverable(Error),
    /// The worker must exit its loop.
    Fatal(Error),
}

impl LoopError {
    /// The underlying transport error.
    pub fn cause(&self) -> Error {
        match *self {
            LoopError::Recoverable(cause) | LoopError::Fatal(cause) => cause,
        }
    }

    /// Whether the worker must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoopError::Fatal(_))
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Recoverable(cause) => write!(f, "recoverable: {cause}"),
            LoopError::Fatal(cause) => write!(f, "fatal: {cause}"),
        }
    }
}

impl std::error::Error for LoopError {}

#[cfg(feature = "defmt")]
impl defmt::Format for LoopError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LoopError::Recoverable(cause) => defmt::write!(f, "Recoverable({})", cause),
            LoopError::Fatal(cause) => defmt::write!(f, "Fatal({})", cause),
        }
    }
}

/// The network-loop driver the worker runs.
///
/// Implementations own the socket and the packet codec. Both methods may
/// block; the core never holds its state lock while calling them.
pub trait NetworkLoop: Send + 'static {
    /// Performs one bounded wait plus I/O processing pass.
    ///
    /// The wait should cover the client socket and the context's wakeup
    /// channel, and last at most `timeout_ms`. Keepalive pings and retry
    /// timers are expected to be serviced here; the worker re-invokes this at
    /// keepalive cadence.
    fn run_iteration(&mut self, ctx: &LoopContext<'_>, timeout_ms: u64) -> Result<(), LoopError>;

    /// Attempts to (re)establish the transport connection.
    fn reconnect(&mut self, ctx: &LoopContext<'_>) -> Result<(), Error>;
}

/// What a driver may see and do while the worker is calling it.
pub struct LoopContext<'a> {
    shared: &'a Shared,
    flags: &'a WorkerFlags,
}

impl<'a> LoopContext<'a> {
    pub(crate) fn new(shared: &'a Shared, flags: &'a WorkerFlags) -> Self {
        Self { shared, flags }
    }

    /// Current connection state, read under the state lock.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Advances the connection state, rejecting illegal transitions.
    pub fn set_connection_state(&self, next: ConnectionState) -> Result<(), crate::Error> {
        self.shared.control.write().connection.transition(next)
    }

    /// The configured keepalive interval in seconds; zero means disabled.
    pub fn keepalive_seconds(&self) -> u16 {
        self.shared.options.keepalive_seconds
    }

    /// The channel other threads signal to interrupt this pass.
    pub fn wakeup(&self) -> &WakeupChannel {
        &self.shared.wakeup
    }

    /// Waits on the wakeup channel alone, for drivers with nothing else to
    /// multiplex.
    pub fn wait(&self, timeout_ms: u64) -> Result<Wake, crate::Error> {
        self.shared.wakeup.wait(Duration::from_millis(timeout_ms))
    }

    /// Whether the application asked the worker to stop.
    pub fn stop_requested(&self) -> bool {
        self.flags.stop.load(Ordering::Acquire)
    }

    /// Whether a forced stop was requested; drivers should abandon their
    /// wait and return as soon as possible.
    pub fn is_cancelled(&self) -> bool {
        self.flags.cancel.load(Ordering::Acquire)
    }
}

impl fmt::Debug for LoopContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("state", &self.connection_state())
            .field("stop", &self.stop_requested())
            .field("cancel", &self.is_cancelled())
            .finish()
    }
}
