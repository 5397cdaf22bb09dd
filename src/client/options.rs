//! Worker configuration.

use crate::error::Error;
use heapless::String;
use serde::Deserialize;

/// Loop timeout used when keepalive is disabled: one day.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 86_400_000;

/// Default name given to the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "mqtt-loop";

/// How long to wait between reconnect attempts.
///
/// The n-th consecutive retry (counting from zero) waits
/// `delay_ms * (n + 1)`, or `delay_ms * (n + 1)^2` with
/// `exponential_backoff`, capped at `delay_max_ms`. When `delay_max_ms`
/// equals `delay_ms` every retry waits `delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Base delay in milliseconds. Must be non-zero.
    pub delay_ms: u64,
    /// Upper bound in milliseconds. Must be at least `delay_ms`.
    pub delay_max_ms: u64,
    /// Grow the delay quadratically instead of linearly.
    pub exponential_backoff: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            delay_max_ms: 1_000,
            exponential_backoff: false,
        }
    }
}

/// Configuration for a [`Client`](super::Client).
///
/// # Examples
///
/// ```rust
/// use mqtt_loop::client::Options;
///
/// let options = Options::from_json(br#"{"keepalive_seconds": 30}"#).unwrap();
/// assert_eq!(options.loop_timeout_ms(), 30_000);
///
/// let idle = Options { keepalive_seconds: 0, ..Options::default() };
/// assert_eq!(idle.loop_timeout_ms(), 86_400_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Keepalive interval in seconds; `0` disables keepalive-driven wakeups.
    pub keepalive_seconds: u16,
    /// Loop timeout in milliseconds when keepalive is disabled.
    pub idle_timeout_ms: u64,
    /// Retry pacing after a lost connection or a failed connect.
    pub reconnect: ReconnectPolicy,
    /// How long a forced stop waits for the worker before detaching it.
    pub force_stop_grace_ms: u64,
    /// Name of the worker thread.
    pub thread_name: String<16>,
}

impl Default for Options {
    fn default() -> Self {
        let mut thread_name = String::new();
        // Shorter than the capacity.
        let _ = thread_name.push_str(DEFAULT_THREAD_NAME);
        Self {
            keepalive_seconds: 60,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            reconnect: ReconnectPolicy::default(),
            force_stop_grace_ms: 250,
            thread_name,
        }
    }
}

impl Options {
    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let (options, _) =
            serde_json_core::from_slice::<Options>(json).map_err(|_| Error::InvalidConfig)?;
        options.validate()?;
        Ok(options)
    }

    /// Checks the values the worker relies on.
    pub fn validate(&self) -> Result<(), Error> {
        if self.reconnect.delay_ms == 0 || self.reconnect.delay_max_ms < self.reconnect.delay_ms {
            return Err(Error::InvalidConfig);
        }
        if self.idle_timeout_ms == 0 || self.thread_name.is_empty() {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Timeout handed to each driver pass.
    pub fn loop_timeout_ms(&self) -> u64 {
        if self.keepalive_seconds == 0 {
            self.idle_timeout_ms
        } else {
            u64::from(self.keepalive_seconds) * 1000
        }
    }
}
