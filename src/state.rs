//! Connection state machine and worker threading mode.
//!
//! Both values are the only fields written by the application thread and the
//! worker thread alike; the client keeps them behind its state lock.
//!
//! ```text
//!              connect_async              reconnect ok
//!   None ─────────────────────► ConnectingAsync ─────────► Connected
//!                                 │      ▲                   │    │
//!                   reconnect err │      │ retry             │    │ disconnect()
//!                                 ▼      │                   │    ▼
//!                               Disconnected ◄───── lost ────┘  Disconnecting
//!                                      ▲                             │
//!                                      └─────────────────────────────┘
//! ```

use crate::error::Error;
use core::fmt;

/// Lifecycle of the client's network connection.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum ConnectionState {
    /// Nothing requested yet.
    #[default]
    None,
    /// A connect was requested; the worker should attempt it.
    ConnectingAsync,
    /// The transport is established.
    Connected,
    /// The application asked to disconnect; the worker is winding down.
    Disconnecting,
    /// The transport is down, either after a failure or a completed disconnect.
    Disconnected,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub const fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (None | Disconnected, ConnectingAsync)
                | (ConnectingAsync, Connected | Disconnected)
                | (Connected, Disconnecting | Disconnected)
                | (Disconnecting, Disconnected)
        )
    }

    /// Moves to `next`, or fails with [`Error::InvalidArgument`] if the move is
    /// not allowed. The state is left unchanged on failure.
    pub fn transition(&mut self, next: ConnectionState) -> Result<(), Error> {
        if self.can_transition(next) {
            *self = next;
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::None => "none",
            ConnectionState::ConnectingAsync => "connecting-async",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectionState::None => defmt::write!(f, "None"),
            ConnectionState::ConnectingAsync => defmt::write!(f, "ConnectingAsync"),
            ConnectionState::Connected => defmt::write!(f, "Connected"),
            ConnectionState::Disconnecting => defmt::write!(f, "Disconnecting"),
            ConnectionState::Disconnected => defmt::write!(f, "Disconnected"),
        }
    }
}

/// Who drives the network loop.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum ThreadingMode {
    /// No loop is being driven.
    #[default]
    None,
    /// A worker thread owned by the client.
    SelfManaged,
    /// The embedding application drives the loop on its own thread.
    External,
}

impl fmt::Display for ThreadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreadingMode::None => "none",
            ThreadingMode::SelfManaged => "self-managed",
            ThreadingMode::External => "external",
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadingMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ThreadingMode::None => defmt::write!(f, "None"),
            ThreadingMode::SelfManaged => defmt::write!(f, "SelfManaged"),
            ThreadingMode::External => defmt::write!(f, "External"),
        }
    }
}
