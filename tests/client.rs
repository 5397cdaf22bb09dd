#![cfg(feature = "threading")]

mod common;

use common::{MockDriver, Waiting, init_logging, wait_until};
use mqtt_loop::Error;
use mqtt_loop::client::{Client, LoopExit, Options, ReconnectPolicy};
use mqtt_loop::network::{self, LoopContext, LoopError, NetworkLoop};
use mqtt_loop::state::{ConnectionState, ThreadingMode};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

const SETTLE: Duration = Duration::from_secs(5);

/// Waits on the wakeup channel and finishes a requested disconnect in the
/// same pass, like a poll-based driver that sends DISCONNECT once woken.
struct SamePassDisconnect;

impl NetworkLoop for SamePassDisconnect {
    fn run_iteration(&mut self, ctx: &LoopContext<'_>, timeout_ms: u64) -> Result<(), LoopError> {
        ctx.wait(timeout_ms)
            .map_err(|_| LoopError::Fatal(network::Error::ReadError))?;
        if ctx.connection_state() == ConnectionState::Disconnecting {
            ctx.set_connection_state(ConnectionState::Disconnected)
                .map_err(|_| LoopError::Fatal(network::Error::ProtocolError))?;
        }
        Ok(())
    }

    fn reconnect(&mut self, _ctx: &LoopContext<'_>) -> Result<(), network::Error> {
        Ok(())
    }
}

fn options(keepalive_seconds: u16) -> Options {
    Options {
        keepalive_seconds,
        reconnect: ReconnectPolicy {
            delay_ms: 10,
            delay_max_ms: 40,
            exponential_backoff: true,
        },
        ..Options::default()
    }
}

#[test]
fn test_double_start_rejected() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();

    client.start_loop().unwrap();
    assert_eq!(client.start_loop(), Err(Error::InvalidArgument));
    assert_eq!(client.threading_mode(), ThreadingMode::SelfManaged);

    // The first worker keeps running.
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) > 0));
    client.stop_loop(false).unwrap();
}

#[test]
fn test_stop_is_terminal() {
    init_logging();
    let (driver, _stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();

    assert_eq!(client.stop_loop(false), Err(Error::InvalidArgument));
    client.start_loop().unwrap();
    client.stop_loop(false).unwrap();
    assert_eq!(client.threading_mode(), ThreadingMode::None);
    assert_eq!(client.stop_loop(false), Err(Error::InvalidArgument));
    assert_eq!(client.stop_loop(true), Err(Error::InvalidArgument));
}

#[test]
fn test_cooperative_stop_interrupts_idle_wait() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) > 0));

    let started = Instant::now();
    client.stop_loop(false).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_forced_stop_bounds_latency() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let driver = driver.waiting(Waiting::CancelOnly);
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) > 0));

    let started = Instant::now();
    client.stop_loop(true).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(client.threading_mode(), ThreadingMode::None);
}

#[test]
fn test_forced_stop_detaches_unresponsive_worker() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let driver = driver.waiting(Waiting::Stubborn(Duration::from_millis(400)));
    let opts = Options {
        force_stop_grace_ms: 20,
        ..options(0)
    };
    let mut client = Client::new(driver, opts).unwrap();
    client.start_loop().unwrap();
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) > 0));

    let started = Instant::now();
    client.stop_loop(true).unwrap();
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(client.threading_mode(), ThreadingMode::None);

    // A fresh worker waits for the detached one to let go of the driver.
    client.start_loop().unwrap();
    client.stop_loop(false).unwrap();
}

#[test]
fn test_connect_async_reaches_connected() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();

    client.connect_async().unwrap();
    assert_eq!(client.connect_async(), Err(Error::InvalidArgument));
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    assert_eq!(stats.reconnects.load(Ordering::SeqCst), 1);

    client.stop_loop(false).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn test_connect_requested_before_start() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver, options(30)).unwrap();
    client.connect_async().unwrap();
    client.start_loop().unwrap();

    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) > 0));
    assert_eq!(stats.last_timeout_ms.load(Ordering::SeqCst), 30_000);
    client.stop_loop(false).unwrap();
}

#[test]
fn test_failed_connects_are_retried() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let driver = driver.connect_results(&[
        Err(network::Error::ConnectionRefused),
        Err(network::Error::Timeout),
    ]);
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();
    client.connect_async().unwrap();

    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    assert_eq!(stats.reconnects.load(Ordering::SeqCst), 3);
    client.stop_loop(false).unwrap();
}

#[test]
fn test_lost_connection_reconnects() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();
    client.connect_async().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));

    stats.drop_connection.store(true, Ordering::SeqCst);
    client.wake();
    assert!(wait_until(SETTLE, || stats.reconnects.load(Ordering::SeqCst) == 2));
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    client.stop_loop(false).unwrap();
}

#[test]
fn test_disconnect_ends_worker_and_restart_reaps_it() {
    init_logging();
    let (driver, _stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();
    client.start_loop().unwrap();
    assert_eq!(client.disconnect(), Err(Error::InvalidArgument));

    client.connect_async().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    client.disconnect().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Disconnected));

    // The worker left its loop on its own; a new start joins it first.
    assert!(wait_until(SETTLE, || client.start_loop().is_ok()));
    client.connect_async().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    client.stop_loop(false).unwrap();
}

#[test]
fn test_fatal_error_ends_worker() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let mut client = Client::new(driver.fatal_after(1), options(0)).unwrap();
    client.start_loop().unwrap();
    assert!(wait_until(SETTLE, || stats.iterations.load(Ordering::SeqCst) == 1));

    // Still self-managed until the application stops or restarts it.
    assert_eq!(client.threading_mode(), ThreadingMode::SelfManaged);
    client.stop_loop(false).unwrap();
    assert_eq!(client.threading_mode(), ThreadingMode::None);
}

#[test]
fn test_external_threading_is_exclusive() {
    init_logging();
    let (driver, _stats) = MockDriver::new();
    let mut client = Client::new(driver, options(0)).unwrap();

    client.set_external_threading(true).unwrap();
    assert_eq!(client.threading_mode(), ThreadingMode::External);
    assert_eq!(client.start_loop(), Err(Error::InvalidArgument));
    assert_eq!(client.stop_loop(false), Err(Error::InvalidArgument));

    client.set_external_threading(false).unwrap();
    client.start_loop().unwrap();
    assert_eq!(client.set_external_threading(true), Err(Error::InvalidArgument));
    assert_eq!(client.loop_forever(), Err(Error::InvalidArgument));
    client.stop_loop(false).unwrap();
}

#[test]
fn test_loop_forever_on_application_thread() {
    init_logging();
    let (driver, stats) = MockDriver::new();
    let client = Client::new(driver.fatal_after(1), options(0)).unwrap();
    client.set_external_threading(true).unwrap();
    client.connect_async().unwrap();

    let exit = client.loop_forever().unwrap();
    assert_eq!(exit, LoopExit::Fatal(network::Error::ProtocolError));
    assert_eq!(stats.reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn test_loop_forever_returns_after_disconnect() {
    init_logging();
    let (driver, _stats) = MockDriver::new();
    let client = Client::new(driver, options(0)).unwrap();
    let handle = client.handle();
    client.connect_async().unwrap();

    let disconnector = thread::spawn(move || {
        assert!(wait_until(SETTLE, || handle.state() == ConnectionState::Connected));
        handle.disconnect().unwrap();
    });
    assert_eq!(client.loop_forever(), Ok(LoopExit::Disconnected));
    disconnector.join().unwrap();
}

#[test]
fn test_invalid_options_rejected() {
    let (driver, _stats) = MockDriver::new();
    let opts = Options {
        idle_timeout_ms: 0,
        ..Options::default()
    };
    assert!(matches!(Client::new(driver, opts), Err(Error::InvalidConfig)));
}

#[test]
fn test_options_from_env_file() {
    dotenvy::dotenv().ok();
    let json = std::env::var("MQTT_LOOP_OPTIONS")
        .unwrap_or_else(|_| r#"{"keepalive_seconds":15,"thread_name":"env-loop"}"#.to_string());
    let opts = Options::from_json(json.as_bytes()).unwrap();
    let (driver, _stats) = MockDriver::new();
    let mut client = Client::new(driver, opts).unwrap();
    client.start_loop().unwrap();
    client.stop_loop(false).unwrap();
}

#[test]
fn test_loop_forever_returns_when_disconnect_completes_mid_pass() {
    init_logging();
    let client = Client::new(SamePassDisconnect, options(0)).unwrap();
    let handle = client.handle();
    client.connect_async().unwrap();

    let disconnector = thread::spawn(move || {
        assert!(wait_until(SETTLE, || handle.state() == ConnectionState::Connected));
        // Let the loop settle into its long wait before disconnecting.
        thread::sleep(Duration::from_millis(50));
        handle.disconnect().unwrap();
    });
    assert_eq!(client.loop_forever(), Ok(LoopExit::Disconnected));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    disconnector.join().unwrap();
}

#[test]
fn test_worker_exits_when_disconnect_completes_mid_pass() {
    init_logging();
    let mut client = Client::new(SamePassDisconnect, options(0)).unwrap();
    client.start_loop().unwrap();
    client.connect_async().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Connected));
    thread::sleep(Duration::from_millis(50));

    client.disconnect().unwrap();
    assert!(wait_until(SETTLE, || client.state() == ConnectionState::Disconnected));
    // Only a worker that left its loop is reaped by a new start.
    assert!(wait_until(SETTLE, || client.start_loop().is_ok()));
    client.stop_loop(false).unwrap();
}
