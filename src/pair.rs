//! Connected loopback TCP pairs for exercising full-duplex code paths.

use std::io;
use std::net::{TcpListener, TcpStream};

use crate::conn::Conn;

/// Establish one full-duplex pair of connected TCP endpoints over an
/// ephemeral loopback listener. Returns `(client, server)`.
pub fn new() -> io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let client = TcpStream::connect(listener.local_addr()?)?;
    let (server, _) = listener.accept()?;
    Ok((client, server))
}

/// Shut down every endpoint, returning the first error encountered while
/// still closing the rest.
pub fn cleanup(conns: &[&dyn Conn]) -> io::Result<()> {
    let mut first = None;
    for conn in conns {
        if let Err(err) = conn.shutdown() {
            log::debug!("pair.cleanup: shutdown failed: {err}");
            if first.is_none() {
                first = Some(err);
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::time::Duration;

    /// Endpoint stub whose shutdown outcome is fixed up front.
    struct StubConn {
        fail_shutdown: bool,
        shutdown_called: Mutex<bool>,
    }

    impl StubConn {
        fn new(fail_shutdown: bool) -> Self {
            Self {
                fail_shutdown,
                shutdown_called: Mutex::new(false),
            }
        }
    }

    impl Conn for StubConn {
        fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }

        fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn shutdown(&self) -> io::Result<()> {
            *self.shutdown_called.lock() = true;
            if self.fail_shutdown {
                Err(io::Error::new(io::ErrorKind::NotConnected, "already gone"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn cleanup_closes_every_endpoint() {
        let a = StubConn::new(false);
        let b = StubConn::new(false);

        cleanup(&[&a, &b]).unwrap();

        assert!(*a.shutdown_called.lock());
        assert!(*b.shutdown_called.lock());
    }

    #[test]
    fn cleanup_returns_first_error_but_keeps_going() {
        let a = StubConn::new(true);
        let b = StubConn::new(false);

        let err = cleanup(&[&a, &b]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        // The failing endpoint did not stop the second from being closed.
        assert!(*b.shutdown_called.lock());
    }
}
