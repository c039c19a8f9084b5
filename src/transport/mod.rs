//! Byte-transport abstraction for the command channel
//!
//! The control protocol only needs a readable/writable byte pipe, so it is
//! written against this trait; production uses [`TcpTransport`], tests script
//! replies through [`MockTransport`].

use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

mod mock;
pub use mock::MockTransport;

/// Byte pipe for command/reply traffic
pub trait Transport: Send {
    /// Read available bytes into `buffer`
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's poll
    /// window; a closed pipe is an error, not a zero read.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush pending writes
    fn flush(&mut self) -> Result<()>;
}

/// Resolve `host:port` and connect within `timeout`
///
/// Shared by the command transport and the per-stream data sockets.
pub fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Other(format!("cannot resolve {}:{}", host, port)))?;
    Ok(TcpStream::connect_timeout(&addr, timeout)?)
}

/// TCP transport for the base station's command port
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port` within `connect_timeout`; subsequent reads poll
    /// in `read_poll` slices so callers can enforce their own deadlines
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_poll: Duration,
    ) -> Result<Self> {
        let stream = connect_tcp(host, port, connect_timeout)?;
        stream.set_read_timeout(Some(read_poll))?;
        let _ = stream.set_nodelay(true);
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            // A zero read on TCP means the peer closed the command port
            Ok(0) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "command connection closed",
            ))),
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}
