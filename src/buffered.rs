//! Buffered connection wrapper with a background reader thread.
//!
//! [`BufferedConn`] decorates a [`Conn`] and keeps draining it from a
//! dedicated thread into an internal FIFO buffer:
//!
//! - The reader thread performs one blocking read of up to `chunk_size`
//!   bytes per iteration and records the outcome under a lock.
//! - Consumers read from the buffer and wait on a condition variable only
//!   while it is empty and no error is recorded.
//! - Writes bypass the buffer and go straight to the underlying
//!   connection.
//!
//! This lets a test write to a connection and read the reply on the same
//! thread without deadlocking against the peer: the socket is always being
//! drained, regardless of when the consumer gets around to reading.
//!
//! Errors observed by the reader thread are sticky. Once recorded, every
//! `read` returns the error (with nothing consumed, even if bytes are
//! still buffered) until a later successful background read clears it.
//! A closed connection is the one outcome that also stops the reader
//! thread; any other error is retried immediately.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::conn::Conn;

/// Error type for constructing a [`BufferedConn`].
#[derive(Debug, thiserror::Error)]
pub enum BufferedError {
    #[error("chunk size must be greater than zero")]
    ChunkSize,

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Bytes not yet consumed, plus the most recent background-read outcome.
struct Inner {
    buf: VecDeque<u8>,
    last_err: Option<io::Error>,
}

/// State shared between the reader thread and consumers.
struct State {
    inner: Mutex<Inner>,
    data_ready: Condvar,
}

impl State {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                last_err: None,
            }),
            data_ready: Condvar::new(),
        }
    }
}

/// A [`Conn`] decorator that continuously reads from the underlying
/// connection in a background thread.
///
/// # Thread Safety
///
/// - **Thread-safe**: all methods take `&self`; the internal
///   `parking_lot::Mutex` serializes access to the buffer and error slot.
///   Any number of threads may call `read`, `write`, and the accessors
///   concurrently.
/// - **Concurrent read/write**: `write` goes straight to the underlying
///   connection without taking the buffer lock, so a writer never waits
///   for a blocked reader.
/// - **Multiple readers**: concurrent `read` callers are serialized by the
///   lock; the order in which simultaneously blocked callers are woken is
///   unspecified.
pub struct BufferedConn<C: Conn> {
    conn: Arc<C>,
    state: Arc<State>,
    reader: Mutex<Option<JoinHandle<()>>>,
    chunk_size: usize,
}

impl<C: Conn + 'static> BufferedConn<C> {
    /// Wrap `conn`, spawning the background reader thread.
    ///
    /// `chunk_size` is the maximum number of bytes read from the
    /// underlying connection per iteration and must be non-zero.
    pub fn new(conn: C, chunk_size: usize) -> Result<Self, BufferedError> {
        if chunk_size == 0 {
            return Err(BufferedError::ChunkSize);
        }

        let conn = Arc::new(conn);
        let state = Arc::new(State::new());

        let handle = thread::Builder::new()
            .name("bufconn-reader".to_string())
            .spawn({
                let conn = Arc::clone(&conn);
                let state = Arc::clone(&state);
                move || Self::read_loop(&conn, &state, chunk_size)
            })
            .map_err(BufferedError::Spawn)?;

        Ok(Self {
            conn,
            state,
            reader: Mutex::new(Some(handle)),
            chunk_size,
        })
    }
}

impl<C: Conn> BufferedConn<C> {
    /// One blocking read per iteration; the outcome is recorded under the
    /// lock and waiters are notified after every iteration.
    ///
    /// The loop never exits without recording an error first, so a
    /// consumer blocked in [`read`](Self::read) is always woken with a
    /// final outcome.
    fn read_loop(conn: &C, state: &State, chunk_size: usize) {
        let mut chunk = vec![0u8; chunk_size];
        loop {
            match conn.read(&mut chunk) {
                Ok(0) => {
                    log::debug!("buffered.read_loop: connection closed, exiting");
                    let mut inner = state.inner.lock();
                    inner.last_err = Some(closed_error());
                    drop(inner);
                    state.data_ready.notify_all();
                    return;
                }
                Ok(n) => {
                    let mut inner = state.inner.lock();
                    inner.last_err = None;
                    inner.buf.extend(&chunk[..n]);
                    drop(inner);
                    // Notify outside lock
                    state.data_ready.notify_all();
                }
                Err(err) => {
                    let disconnect = is_disconnect(err.kind());
                    if disconnect {
                        log::debug!("buffered.read_loop: disconnected: {err}");
                    } else {
                        log::debug!("buffered.read_loop: transient read error, retrying: {err}");
                    }
                    let mut inner = state.inner.lock();
                    inner.last_err = Some(err);
                    drop(inner);
                    state.data_ready.notify_all();
                    if disconnect {
                        return;
                    }
                    // Anything else is retried immediately, with no delay:
                    // a read timeout left set on the underlying connection
                    // keeps this loop busy until it is cleared.
                }
            }
        }
    }

    /// Read buffered bytes into `buf`, blocking while the buffer is empty,
    /// no error is recorded, and `buf` is non-empty.
    ///
    /// A recorded error takes priority over buffered bytes: it is returned
    /// with nothing consumed until a later successful background read
    /// clears it. A zero-length `buf` returns `Ok(0)` without blocking.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.state.inner.lock();
        loop {
            if let Some(err) = &inner.last_err {
                return Err(copy_error(err));
            }
            if inner.buf.is_empty() && !buf.is_empty() {
                self.state.data_ready.wait(&mut inner);
                continue;
            }
            let n = buf.len().min(inner.buf.len());
            let (front, back) = inner.buf.as_slices();
            if n <= front.len() {
                buf[..n].copy_from_slice(&front[..n]);
            } else {
                buf[..front.len()].copy_from_slice(front);
                buf[front.len()..n].copy_from_slice(&back[..n - front.len()]);
            }
            inner.buf.drain(..n);
            return Ok(n);
        }
    }

    /// Write directly to the underlying connection, bypassing the buffer.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.conn.write(buf)
    }

    /// Shut the underlying connection down and wait for the reader thread
    /// to exit, returning the shutdown result.
    ///
    /// A consumer blocked in [`read`](Self::read) is unblocked by the
    /// reader thread's final error notification, not by `close` itself,
    /// so this does not deadlock against it.
    pub fn close(&self) -> io::Result<()> {
        let result = self.conn.shutdown();
        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                log::warn!("buffered.close: reader thread panicked");
            }
        }
        result
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.inner.lock().buf.len()
    }

    /// Copy of the most recent background-read error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<io::Error> {
        self.state.inner.lock().last_err.as_ref().map(copy_error)
    }

    /// Whether [`close`](Self::close) has already reaped the reader thread.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.lock().is_none()
    }

    /// Maximum size of one background read, fixed at construction.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.conn.peer_addr()
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_timeout(timeout)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_read_timeout(timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_write_timeout(timeout)
    }
}

impl<C: Conn> Conn for BufferedConn<C> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        BufferedConn::read(self, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        BufferedConn::write(self, buf)
    }

    fn flush(&self) -> io::Result<()> {
        self.conn.flush()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.conn.peer_addr()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_write_timeout(timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        self.close()
    }
}

impl<C: Conn> io::Read for BufferedConn<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        BufferedConn::read(self, buf)
    }
}

impl<C: Conn> io::Read for &BufferedConn<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        BufferedConn::read(*self, buf)
    }
}

impl<C: Conn> io::Write for BufferedConn<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedConn::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.flush()
    }
}

impl<C: Conn> io::Write for &BufferedConn<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedConn::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.flush()
    }
}

impl<C: Conn> fmt::Debug for BufferedConn<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.state.inner.lock();
        let buffered = inner.buf.len();
        let error = inner.last_err.as_ref().map(io::Error::kind);
        drop(inner);
        write!(
            f,
            "BufferedConn(chunk_size={}, buffered={buffered}, error={error:?}, closed={})",
            self.chunk_size,
            self.is_closed()
        )
    }
}

impl<C: Conn> Drop for BufferedConn<C> {
    fn drop(&mut self) {
        let open = self.reader.lock().is_some();
        if open {
            if let Err(err) = self.close() {
                log::debug!("buffered.drop: close failed: {err}");
            }
        }
    }
}

/// `io::Error` is not `Clone`; rebuild a value equal in kind and message.
fn copy_error(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed")
}

/// Read outcomes that mean the connection is gone for good.
fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
