//! Buffered stream connections for full-duplex tests.
//!
//! Wrapping an endpoint in [`BufferedConn`] moves all reads onto a
//! dedicated background thread, so a test can write to a connection and
//! read the reply on the same thread without deadlocking against the
//! peer. [`pair`] manufactures connected loopback TCP endpoints to wrap.
//!
//! ```no_run
//! use bufconn::{pair, BufferedConn};
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (client, server) = pair::new()?;
//! let client = BufferedConn::new(client, 512)?;
//! let server = BufferedConn::new(server, 512)?;
//!
//! client.write(b"ping")?;
//! let mut request = [0u8; 4];
//! (&server).read_exact(&mut request)?;
//!
//! client.close()?;
//! server.close()?;
//! # Ok(())
//! # }
//! ```

pub mod buffered;
pub mod conn;
pub mod pair;

pub use buffered::{BufferedConn, BufferedError};
pub use conn::Conn;
