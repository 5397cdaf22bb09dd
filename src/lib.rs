//! # mqtt-loop - MQTT client loop core
//!
//! The concurrency core of an MQTT client: a background worker that owns the
//! client's network loop, can be woken on demand from another thread, exposes
//! its connection state safely to the application and can be stopped
//! cooperatively or forcibly.
//!
//! Packet encoding, sessions and transport security are not part of this
//! crate. The loop consumes them through the [`network::NetworkLoop`] trait.
//!
//! ## Layers
//!
//! - **Clock** ([`time`]): a monotonic millisecond clock, built from the best
//!   counter the platform has, including a 64-bit extension of a wrapping
//!   32-bit tick counter.
//! - **Locks** ([`sync`]): an exclusive/shared mutex handle backed by a native
//!   reader/writer lock, or by a heap-allocated exclusive lock on platforms
//!   without one.
//! - **Wakeup** ([`network::WakeupChannel`]): a self-pipe that interrupts the
//!   worker's bounded wait.
//! - **State** ([`state`]): the connection state machine and threading mode.
//! - **Lifecycle** ([`client`]): `start_loop`, `stop_loop(force)` and
//!   `set_external_threading`.
//!
//! ## Features
//!
//! - `std`: locks, wakeup channel and client (pulls in `parking_lot`, `mio`).
//! - `threading` (default): enables the self-managed worker thread.
//! - `compat-fallback`: always select the legacy lock and clock paths.
//! - `tracing` (default) / `defmt`: logging backend.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mqtt-loop = "0.1.0"
//! ```
//!
//! ```rust
//! use mqtt_loop::sync::MutexHandle;
//!
//! let mutex = MutexHandle::new().unwrap();
//! {
//!     let _guard = mutex.lock().unwrap();
//!     // exclusive section
//! }
//! let earlier = mqtt_loop::time::now();
//! assert!(mqtt_loop::time::now() >= earlier);
//! ```
//!
//! See [`client`] for driving a worker.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

mod trace;

/// Error type shared by every layer.
pub mod error;

/// Single-flight one-time initialization.
pub mod once;

/// Platform capability probe.
pub mod platform;

/// Monotonic millisecond clock.
pub mod time;

/// Connection state machine and threading mode.
pub mod state;

/// Exclusive/shared lock handles with native and fallback implementations.
#[cfg(feature = "std")]
pub mod sync;

/// Wakeup channel and the network-loop driver interface.
#[cfg(feature = "std")]
pub mod network;

/// Worker lifecycle management.
#[cfg(feature = "std")]
pub mod client;

pub use error::Error;
