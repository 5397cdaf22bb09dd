//! Worker lifecycle for one client instance.
//!
//! A [`Client`] owns a network-loop driver and decides who runs it:
//!
//! - [`Client::start_loop`] spawns a self-managed worker thread,
//!   [`Client::stop_loop`] stops and joins it.
//! - [`Client::set_external_threading`] declares that the application runs
//!   the loop itself, typically through [`Client::loop_forever`].
//!
//! The two paths are mutually exclusive. Connection state and threading mode
//! live behind one lock shared by the application thread and the worker; the
//! worker never holds it across I/O.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mqtt_loop::client::{Client, Options};
//! use mqtt_loop::network::{self, LoopContext, LoopError, NetworkLoop};
//!
//! struct Driver;
//!
//! impl NetworkLoop for Driver {
//!     fn run_iteration(&mut self, ctx: &LoopContext<'_>, timeout_ms: u64) -> Result<(), LoopError> {
//!         ctx.wait(timeout_ms).map_err(|_| LoopError::Fatal(network::Error::ReadError))?;
//!         Ok(())
//!     }
//!
//!     fn reconnect(&mut self, _ctx: &LoopContext<'_>) -> Result<(), network::Error> {
//!         Ok(())
//!     }
//! }
//!
//! let mut client = Client::new(Driver, Options::default()).unwrap();
//! client.start_loop().unwrap();
//! client.connect_async().unwrap();
//! client.stop_loop(false).unwrap();
//! ```

#![deny(unsafe_code)]

/// Worker configuration
pub mod options;

mod worker;

pub use options::{Options, ReconnectPolicy};
pub use worker::LoopExit;

use crate::error::Error;
use crate::network::{NetworkLoop, WakeupChannel};
use crate::state::{ConnectionState, ThreadingMode};
use crate::sync::{Guarded, LockLibrary};
use crate::trace::{debug, error, info, warn};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Fields written by both the application thread and the worker.
#[derive(Debug, Default)]
pub(crate) struct Control {
    pub(crate) connection: ConnectionState,
    pub(crate) mode: ThreadingMode,
    /// Set by `disconnect`, consumed by the loop once `Disconnected` is reached.
    pub(crate) disconnect_requested: bool,
}

/// Everything the application thread and the worker share.
pub(crate) struct Shared {
    pub(crate) control: Guarded<Control>,
    pub(crate) wakeup: WakeupChannel,
    pub(crate) options: Options,
}

impl Shared {
    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.control.read().connection
    }

    fn threading_mode(&self) -> ThreadingMode {
        self.control.read().mode
    }

    fn connect_async(&self) -> Result<(), Error> {
        {
            let mut control = self.control.write();
            control.connection.transition(ConnectionState::ConnectingAsync)?;
            control.disconnect_requested = false;
        }
        self.wakeup.signal();
        Ok(())
    }

    fn disconnect(&self) -> Result<(), Error> {
        {
            let mut control = self.control.write();
            control.connection.transition(ConnectionState::Disconnecting)?;
            control.disconnect_requested = true;
        }
        self.wakeup.signal();
        Ok(())
    }
}

/// Stop requests for one worker. Each worker gets its own set so a detached
/// thread keeps seeing its cancellation after a new worker starts.
#[derive(Debug, Default)]
pub(crate) struct WorkerFlags {
    pub(crate) stop: AtomicBool,
    pub(crate) cancel: AtomicBool,
}

impl WorkerFlags {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

struct Worker {
    handle: JoinHandle<LoopExit>,
    // Disconnects when the worker routine returns.
    done: mpsc::Receiver<()>,
    flags: Arc<WorkerFlags>,
}

impl Worker {
    fn join(self) {
        match self.handle.join() {
            Ok(exit) => debug!("worker joined: {}", exit),
            Err(_) => error!("worker panicked"),
        }
    }
}

/// An MQTT client's loop core: connection state, wakeup channel and worker
/// lifecycle around a [`NetworkLoop`] driver.
pub struct Client<D: NetworkLoop> {
    shared: Arc<Shared>,
    driver: Arc<parking_lot::Mutex<D>>,
    worker: Option<Worker>,
}

impl<D: NetworkLoop> Client<D> {
    /// Creates a client using the process-wide lock library.
    pub fn new(driver: D, options: Options) -> Result<Self, Error> {
        Self::with_library(driver, options, LockLibrary::global())
    }

    /// Creates a client whose state lock comes from `library`.
    pub fn with_library(driver: D, options: Options, library: &LockLibrary) -> Result<Self, Error> {
        options.validate()?;
        let shared = Shared {
            control: Guarded::with_library(Control::default(), library)?,
            wakeup: WakeupChannel::new()?,
            options,
        };
        Ok(Self {
            shared: Arc::new(shared),
            driver: Arc::new(parking_lot::Mutex::new(driver)),
            worker: None,
        })
    }

    /// The options this client was created with.
    pub fn options(&self) -> &Options {
        &self.shared.options
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Who currently drives the loop.
    pub fn threading_mode(&self) -> ThreadingMode {
        self.shared.threading_mode()
    }

    /// Requests an asynchronous connect; the loop performs it.
    ///
    /// Fails with [`Error::InvalidArgument`] unless the state is `None` or
    /// `Disconnected`.
    pub fn connect_async(&self) -> Result<(), Error> {
        self.shared.connect_async()
    }

    /// Requests a disconnect of an established connection.
    pub fn disconnect(&self) -> Result<(), Error> {
        self.shared.disconnect()
    }

    /// Interrupts the loop's current wait, for example after queueing
    /// outgoing data.
    pub fn wake(&self) {
        self.shared.wakeup.signal();
    }

    /// A cloneable handle for issuing control calls from other places.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawns the self-managed worker thread.
    ///
    /// Fails with [`Error::InvalidArgument`] if a worker is already running or
    /// external threading is enabled, with [`Error::ResourceExhausted`] if the
    /// OS refuses to spawn the thread and with [`Error::Unsupported`] on builds
    /// without the `threading` feature. A previous worker that already left its
    /// loop on its own is joined first.
    ///
    /// A worker detached by a forced stop keeps the driver until it reaches
    /// its next checkpoint; the new worker waits for it.
    pub fn start_loop(&mut self) -> Result<(), Error> {
        if !cfg!(feature = "threading") {
            return Err(Error::Unsupported);
        }
        self.reap_finished();
        {
            let mut control = self.shared.control.write();
            if control.mode != ThreadingMode::None {
                return Err(Error::InvalidArgument);
            }
            control.mode = ThreadingMode::SelfManaged;
        }

        let shared = Arc::clone(&self.shared);
        let driver = Arc::clone(&self.driver);
        let flags = Arc::new(WorkerFlags::new());
        let worker_flags = Arc::clone(&flags);
        let (done_tx, done) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name(self.shared.options.thread_name.as_str().into())
            .spawn(move || {
                let _done = done_tx;
                let mut driver = driver.lock();
                worker::run(&shared, &worker_flags, &mut *driver)
            });

        match spawned {
            Ok(handle) => {
                info!("worker started");
                self.worker = Some(Worker { handle, done, flags });
                Ok(())
            }
            Err(err) => {
                self.shared.control.write().mode = ThreadingMode::None;
                error!("worker spawn failed: {}", Error::from(err));
                Err(Error::ResourceExhausted)
            }
        }
    }

    /// Stops the self-managed worker and resets the threading mode.
    ///
    /// The stop flag is set and the wakeup channel signalled so a blocked
    /// wait returns; the worker exits at its next checkpoint and is joined.
    ///
    /// With `force`, the driver additionally sees
    /// [`LoopContext::is_cancelled`](crate::network::LoopContext::is_cancelled)
    /// and the call returns after at most
    /// [`Options::force_stop_grace_ms`]. A worker still running by then is
    /// detached and exits on its own later. Forced stop gives no guarantee
    /// about the state of anything the driver was in the middle of changing;
    /// prefer the cooperative path and keep this for shutdown.
    ///
    /// Fails with [`Error::InvalidArgument`] if no self-managed worker exists.
    pub fn stop_loop(&mut self, force: bool) -> Result<(), Error> {
        if !cfg!(feature = "threading") {
            return Err(Error::Unsupported);
        }
        if self.threading_mode() != ThreadingMode::SelfManaged {
            return Err(Error::InvalidArgument);
        }
        let Some(worker) = self.worker.take() else {
            return Err(Error::InvalidArgument);
        };

        worker.flags.stop.store(true, Ordering::Release);
        if force {
            worker.flags.cancel.store(true, Ordering::Release);
        }
        self.shared.wakeup.signal();

        if force {
            let grace = self.shared.options.force_stop_grace_ms;
            match worker.done.recv_timeout(Duration::from_millis(grace)) {
                Err(RecvTimeoutError::Timeout) => {
                    warn!("worker still busy after {} ms, detaching", grace);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => worker.join(),
            }
        } else {
            worker.join();
        }

        self.shared.control.write().mode = ThreadingMode::None;
        info!("worker stopped");
        Ok(())
    }

    /// Declares whether the application drives the loop on its own thread.
    ///
    /// Fails with [`Error::InvalidArgument`] while a self-managed worker
    /// exists.
    pub fn set_external_threading(&self, enabled: bool) -> Result<(), Error> {
        let mut control = self.shared.control.write();
        if control.mode == ThreadingMode::SelfManaged {
            return Err(Error::InvalidArgument);
        }
        control.mode = if enabled {
            ThreadingMode::External
        } else {
            ThreadingMode::None
        };
        Ok(())
    }

    /// Runs the loop routine on the calling thread until a completed
    /// disconnect or a fatal driver error.
    ///
    /// Fails with [`Error::InvalidArgument`] while a self-managed worker
    /// exists.
    pub fn loop_forever(&self) -> Result<LoopExit, Error> {
        if self.threading_mode() == ThreadingMode::SelfManaged {
            return Err(Error::InvalidArgument);
        }
        let flags = WorkerFlags::new();
        let mut driver = self.driver.lock();
        Ok(worker::run(&self.shared, &flags, &mut *driver))
    }

    fn reap_finished(&mut self) {
        if !self.worker.as_ref().is_some_and(|w| w.handle.is_finished()) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            worker.join();
            self.shared.control.write().mode = ThreadingMode::None;
        }
    }
}

impl<D: NetworkLoop> Drop for Client<D> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_loop(true);
        }
    }
}

impl<D: NetworkLoop> fmt::Debug for Client<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("mode", &self.threading_mode())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

/// Control calls that can be issued without owning the [`Client`].
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<Shared>,
}

impl ClientHandle {
    /// See [`Client::state`].
    pub fn state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// See [`Client::connect_async`].
    pub fn connect_async(&self) -> Result<(), Error> {
        self.shared.connect_async()
    }

    /// See [`Client::disconnect`].
    pub fn disconnect(&self) -> Result<(), Error> {
        self.shared.disconnect()
    }

    /// See [`Client::wake`].
    pub fn wake(&self) {
        self.shared.wakeup.signal();
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("state", &self.state())
            .finish()
    }
}
