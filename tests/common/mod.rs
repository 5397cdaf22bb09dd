#![allow(dead_code)]

use mqtt_loop::network::{self, LoopContext, LoopError, NetworkLoop};
use mqtt_loop::state::ConnectionState;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Counters shared between a test and the driver it handed to a client.
#[derive(Debug, Default)]
pub struct Stats {
    pub iterations: AtomicUsize,
    pub reconnects: AtomicUsize,
    pub last_timeout_ms: AtomicU64,
    /// Makes the next pass on a live connection fail as if the peer hung up.
    pub drop_connection: AtomicBool,
}

/// How a pass spends its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waiting {
    /// Waits on the wakeup channel, like a real poll-based driver.
    Wakeable,
    /// Sleeps through the timeout in small steps, only checking for a forced stop.
    CancelOnly,
    /// Sleeps for a fixed time and notices nothing.
    Stubborn(Duration),
}

#[derive(Debug)]
pub struct MockDriver {
    pub stats: Arc<Stats>,
    pub connect_results: VecDeque<Result<(), network::Error>>,
    pub waiting: Waiting,
    pub fatal_after: Option<usize>,
}

impl MockDriver {
    pub fn new() -> (Self, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let driver = Self {
            stats: Arc::clone(&stats),
            connect_results: VecDeque::new(),
            waiting: Waiting::Wakeable,
            fatal_after: None,
        };
        (driver, stats)
    }

    pub fn waiting(mut self, waiting: Waiting) -> Self {
        self.waiting = waiting;
        self
    }

    pub fn connect_results(mut self, results: &[Result<(), network::Error>]) -> Self {
        self.connect_results = results.iter().copied().collect();
        self
    }

    pub fn fatal_after(mut self, passes: usize) -> Self {
        self.fatal_after = Some(passes);
        self
    }

    fn idle(&self, ctx: &LoopContext<'_>, timeout_ms: u64) -> Result<(), LoopError> {
        match self.waiting {
            Waiting::Wakeable => {
                ctx.wait(timeout_ms)
                    .map_err(|_| LoopError::Fatal(network::Error::ReadError))?;
            }
            Waiting::CancelOnly => {
                let deadline = Instant::now() + Duration::from_millis(timeout_ms.min(60_000));
                while !ctx.is_cancelled() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(5));
                }
            }
            Waiting::Stubborn(nap) => thread::sleep(nap),
        }
        Ok(())
    }
}

impl NetworkLoop for MockDriver {
    fn run_iteration(&mut self, ctx: &LoopContext<'_>, timeout_ms: u64) -> Result<(), LoopError> {
        let pass = self.stats.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.last_timeout_ms.store(timeout_ms, Ordering::SeqCst);
        if self.fatal_after.is_some_and(|limit| pass >= limit) {
            return Err(LoopError::Fatal(network::Error::ProtocolError));
        }
        match ctx.connection_state() {
            ConnectionState::Disconnecting => {
                ctx.set_connection_state(ConnectionState::Disconnected)
                    .map_err(|_| LoopError::Fatal(network::Error::ProtocolError))?;
                Ok(())
            }
            ConnectionState::Connected => {
                if self.stats.drop_connection.swap(false, Ordering::SeqCst) {
                    return Err(LoopError::Recoverable(network::Error::ConnectionClosed));
                }
                self.idle(ctx, timeout_ms)
            }
            _ if self.waiting == Waiting::Wakeable => {
                Err(LoopError::Recoverable(network::Error::NotOpen))
            }
            _ => self.idle(ctx, timeout_ms),
        }
    }

    fn reconnect(&mut self, _ctx: &LoopContext<'_>) -> Result<(), network::Error> {
        self.stats.reconnects.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
