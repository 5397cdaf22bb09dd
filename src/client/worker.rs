//! The loop routine the worker thread (or `loop_forever`) runs.

use super::options::ReconnectPolicy;
use super::{Shared, WorkerFlags};
use crate::network::{self, LoopContext, LoopError, NetworkLoop};
use crate::state::ConnectionState;
use crate::trace::{debug, error, info, warn};
use core::fmt;
use core::sync::atomic::Ordering;

/// Why the loop routine returned.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LoopExit {
    /// A cooperative stop was observed at a checkpoint.
    Stopped,
    /// A forced stop was observed at a checkpoint.
    Cancelled,
    /// An application-requested disconnect completed.
    Disconnected,
    /// The driver reported a failure it cannot recover from.
    Fatal(network::Error),
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Stopped => f.write_str("stopped"),
            LoopExit::Cancelled => f.write_str("cancelled"),
            LoopExit::Disconnected => f.write_str("disconnected"),
            LoopExit::Fatal(cause) => write!(f, "fatal: {cause}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LoopExit {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LoopExit::Stopped => defmt::write!(f, "Stopped"),
            LoopExit::Cancelled => defmt::write!(f, "Cancelled"),
            LoopExit::Disconnected => defmt::write!(f, "Disconnected"),
            LoopExit::Fatal(cause) => defmt::write!(f, "Fatal({})", cause),
        }
    }
}

/// Delay sequence for consecutive reconnect attempts.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    retries: u64,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Delay before the next attempt, in milliseconds.
    pub(crate) fn next_delay_ms(&mut self) -> u64 {
        let ReconnectPolicy {
            delay_ms,
            delay_max_ms,
            exponential_backoff,
        } = self.policy;
        if delay_max_ms <= delay_ms {
            return delay_ms;
        }
        let step = self.retries + 1;
        let delay = if exponential_backoff {
            delay_ms.saturating_mul(step.saturating_mul(step))
        } else {
            delay_ms.saturating_mul(step)
        };
        if delay >= delay_max_ms {
            delay_max_ms
        } else {
            self.retries += 1;
            delay
        }
    }

    pub(crate) fn reset(&mut self) {
        self.retries = 0;
    }
}

fn checkpoint(flags: &WorkerFlags) -> Option<LoopExit> {
    if flags.cancel.load(Ordering::Acquire) {
        Some(LoopExit::Cancelled)
    } else if flags.stop.load(Ordering::Acquire) {
        Some(LoopExit::Stopped)
    } else {
        None
    }
}

/// Drives `driver` until a stop, a completed disconnect or a fatal error.
///
/// The state lock is only held for reads and transitions, never across a
/// driver call or a wait.
pub(crate) fn run<D: NetworkLoop>(shared: &Shared, flags: &WorkerFlags, driver: &mut D) -> LoopExit {
    let ctx = LoopContext::new(shared, flags);
    let timeout_ms = shared.options.loop_timeout_ms();
    let mut backoff = Backoff::new(shared.options.reconnect);
    let mut retry_pending = false;

    debug!("loop started, pass timeout {} ms", timeout_ms);
    loop {
        if let Some(exit) = checkpoint(flags) {
            return exit;
        }

        if retry_pending {
            let delay = backoff.next_delay_ms();
            debug!("reconnecting in {} ms", delay);
            if let Err(err) = ctx.wait(delay) {
                warn!("backoff wait failed: {}", err);
            }
            if let Some(exit) = checkpoint(flags) {
                return exit;
            }
            retry_pending = false;
            let mut control = shared.control.write();
            // `connect_async` may already have moved us on during the wait.
            if control.connection == ConnectionState::Disconnected {
                let _ = control.connection.transition(ConnectionState::ConnectingAsync);
            }
        }

        if shared.connection_state() == ConnectionState::ConnectingAsync {
            match driver.reconnect(&ctx) {
                Ok(()) => {
                    if ctx.set_connection_state(ConnectionState::Connected).is_ok() {
                        info!("connected");
                    }
                    backoff.reset();
                }
                Err(cause) => {
                    warn!("connect failed: {}", cause);
                    let _ = ctx.set_connection_state(ConnectionState::Disconnected);
                    retry_pending = true;
                    continue;
                }
            }
        }

        let outcome = driver.run_iteration(&ctx, timeout_ms);
        if let Err(LoopError::Fatal(cause)) = outcome {
            error!("network loop failed: {}", cause);
            return LoopExit::Fatal(cause);
        }
        if disconnect_completed(shared) {
            info!("disconnected");
            return LoopExit::Disconnected;
        }
        if let Err(LoopError::Recoverable(cause)) = outcome {
            let mut control = shared.control.write();
            match control.connection {
                ConnectionState::Disconnecting => {
                    let _ = control.connection.transition(ConnectionState::Disconnected);
                    control.disconnect_requested = false;
                    info!("disconnected: {}", cause);
                    return LoopExit::Disconnected;
                }
                ConnectionState::Connected => {
                    let _ = control.connection.transition(ConnectionState::Disconnected);
                    warn!("connection lost: {}", cause);
                    retry_pending = true;
                }
                ConnectionState::ConnectingAsync => {}
                ConnectionState::None | ConnectionState::Disconnected => {
                    drop(control);
                    debug!("idle: {}", cause);
                    if let Err(err) = ctx.wait(timeout_ms) {
                        warn!("idle wait failed: {}", err);
                    }
                }
            }
        }
    }
}

/// Whether an application-requested disconnect has reached `Disconnected`,
/// no matter which pass completed it. Consumes the request.
fn disconnect_completed(shared: &Shared) -> bool {
    let mut control = shared.control.write();
    if control.disconnect_requested && control.connection == ConnectionState::Disconnected {
        control.disconnect_requested = false;
        true
    } else {
        false
    }
}
