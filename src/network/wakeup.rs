//! Self-pipe used to interrupt the worker's blocking wait.
//!
//! The channel is a connected pair of stream endpoints: a Unix socket pair on
//! Unix, a loopback TCP pair elsewhere. [`WakeupChannel::signal`] writes one
//! byte to the write end; the read end is one of the descriptors the worker
//! waits on. A `pending` flag keeps at most one byte buffered, so any number
//! of signals before a drain collapse into a single wake.

use crate::error::Error;
use crate::sync::Guarded;
use crate::trace::trace;
use core::sync::atomic::{AtomicBool, Ordering};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

#[cfg(unix)]
use mio::net::UnixStream as Endpoint;
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
#[cfg(not(unix))]
use mio::net::TcpStream as Endpoint;

const READER: Token = Token(0);
const DRAIN_CHUNK: usize = 16;

/// Why [`WakeupChannel::wait`] returned.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Wake {
    /// At least one signal arrived; pending bytes were drained.
    Signalled,
    /// The timeout elapsed without a signal.
    TimedOut,
}

struct Poller {
    poll: Poll,
    events: Events,
}

/// Loopback byte channel that breaks a blocking wait from another thread.
pub struct WakeupChannel {
    writer: Endpoint,
    reader: Endpoint,
    pending: AtomicBool,
    poller: Guarded<Poller>,
}

impl WakeupChannel {
    /// Creates the endpoint pair and registers the read end for readiness.
    pub fn new() -> Result<Self, Error> {
        let (writer, mut reader) = endpoint_pair()?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut reader, READER, Interest::READABLE)?;
        Ok(Self {
            writer,
            reader,
            pending: AtomicBool::new(false),
            poller: Guarded::new(Poller {
                poll,
                events: Events::with_capacity(4),
            })?,
        })
    }

    /// Wakes the waiter. Safe to call from any thread, any number of times.
    ///
    /// Write failures are ignored: the waiter only needs to see that a wake
    /// happened, and a byte is already buffered whenever the write end is
    /// full.
    pub fn signal(&self) {
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = (&self.writer).write(&[0u8]) {
            trace!("wakeup write ignored: {}", io_kind(&err));
        }
    }

    /// Whether a signal is buffered and not yet drained.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Reads every buffered byte and re-arms the channel.
    ///
    /// Returns the number of bytes consumed. The pending flag is cleared only
    /// after the read end is empty, so a signal racing with the drain is
    /// either consumed here or written after the flag clears.
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; DRAIN_CHUNK];
        let mut total = 0;
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        self.pending.store(false, Ordering::Release);
        total
    }

    /// Blocks until signalled or until `timeout` elapses.
    ///
    /// The channel has a single waiter. A call made while another thread is
    /// already waiting fails at once with [`Error::InvalidArgument`] instead
    /// of queueing behind it. A timeout too large to represent as a deadline
    /// waits indefinitely.
    pub fn wait(&self, timeout: Duration) -> Result<Wake, Error> {
        if self.is_pending() && self.drain() > 0 {
            return Ok(Wake::Signalled);
        }
        let deadline = Instant::now().checked_add(timeout);
        let mut poller = self.poller.try_write().ok_or(Error::InvalidArgument)?;
        let Poller { poll, events } = &mut *poller;
        loop {
            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            match poll.poll(events, remaining) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
            // A readiness edge may belong to bytes an earlier `drain` already
            // consumed; only a non-empty drain counts as a wake.
            if !events.is_empty() && self.drain() > 0 {
                return Ok(Wake::Signalled);
            }
            if remaining.is_some_and(|left| left.is_zero()) {
                return Ok(Wake::TimedOut);
            }
        }
    }
}

impl core::fmt::Debug for WakeupChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WakeupChannel")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// The read end, for drivers that multiplex it into their own poll set
/// (for example through `mio::unix::SourceFd`).
#[cfg(unix)]
impl AsRawFd for WakeupChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

#[cfg(unix)]
fn endpoint_pair() -> io::Result<(Endpoint, Endpoint)> {
    Endpoint::pair()
}

#[cfg(not(unix))]
fn endpoint_pair() -> io::Result<(Endpoint, Endpoint)> {
    use std::net::{Ipv4Addr, TcpListener, TcpStream};

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let writer = TcpStream::connect(listener.local_addr()?)?;
    let (reader, _) = listener.accept()?;
    writer.set_nodelay(true)?;
    writer.set_nonblocking(true)?;
    reader.set_nonblocking(true)?;
    Ok((Endpoint::from_std(writer), Endpoint::from_std(reader)))
}

fn io_kind(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::WouldBlock => "would block",
        io::ErrorKind::BrokenPipe => "broken pipe",
        _ => "io error",
    }
}
