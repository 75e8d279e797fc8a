//! The stream-connection surface wrapped by [`BufferedConn`].
//!
//! Every method takes `&self`, so one thread can sit in a blocking read
//! while another writes to the same endpoint. `TcpStream` already works
//! this way (`Read` is implemented for `&TcpStream`); the trait pins that
//! shape down so decorators and test doubles can stand in for a real
//! socket.
//!
//! [`BufferedConn`]: crate::buffered::BufferedConn

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// A bidirectional, ordered, reliable byte-stream endpoint.
pub trait Conn: Send + Sync {
    /// Read up to `buf.len()` bytes, blocking until at least one byte is
    /// available. `Ok(0)` means the connection was closed, locally or by
    /// the peer.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the bytes in `buf`, returning how many were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Flush any transport-level write buffering. No-op by default.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Set the timeout for both directions at once.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut the connection down in both directions. A read blocked on the
    /// same endpoint observes `Ok(0)` afterwards.
    fn shutdown(&self) -> io::Result<()>;
}

impl Conn for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl<C: Conn + ?Sized> Conn for Arc<C> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        (**self).peer_addr()
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_write_timeout(timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        (**self).shutdown()
    }
}
