//! TCP client and server transports, each keeping a [`NamedCache`] of
//! connections so a test script can open several and address them by
//! alias.

use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::ResultExt;
use tracing::debug;

use super::{NamedCache, NetError, Result, Transport};

/// Matches the scripting layer's TCP receive buffer size.
pub const TCP_BUFFER_SIZE: usize = 1_000_000;

/// Matches the scripting layer's backlog for incoming connections.
pub const TCP_MAX_QUEUED_CONNECTIONS: i32 = 5;

/// A TCP client holding zero or more named connections to peers.
#[derive(Default)]
pub struct TcpClient {
    connections: NamedCache<TcpStream>,
}

impl TcpClient {
    pub fn new() -> Self {
        TcpClient {
            connections: NamedCache::new(),
        }
    }

    /// Open a new connection, returning the alias it was registered
    /// under.
    pub fn connect(&mut self, address: impl ToSocketAddrs, alias: Option<String>) -> Result<String> {
        let stream = TcpStream::connect(address).context(super::IoSnafu)?;
        Ok(self.connections.insert(alias, stream))
    }

    pub fn send(&mut self, alias: Option<&str>, data: &[u8]) -> Result<usize> {
        use std::io::Write;
        let stream = self.connections.get_mut(alias)?;
        stream.write(data).context(super::IoSnafu)
    }

    /// Close and drop a connection.
    pub fn close_connection(&mut self, alias: Option<&str>) -> Result<()> {
        self.connections.remove(alias)?;
        Ok(())
    }

    pub fn receive_on(&mut self, alias: Option<&str>, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        receive_from(self.connections.get_mut(alias).map_err(to_io_error)?, timeout)
    }
}

/// A TCP server listening on a local port, accepting connections into
/// its own [`NamedCache`].
pub struct TcpServer {
    listener: TcpListener,
    connections: NamedCache<TcpStream>,
}

impl TcpServer {
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(address).context(super::IoSnafu)?;
        Ok(TcpServer {
            listener,
            connections: NamedCache::new(),
        })
    }

    /// Block (respecting the caller's timeout, if any) for the next
    /// inbound connection, registering it under `alias`.
    pub fn accept_connection(&mut self, alias: Option<String>, timeout: Option<Duration>) -> std::io::Result<String> {
        self.listener.set_nonblocking(timeout.is_some())?;
        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "tcp server accepted connection");
                    return Ok(self.connections.insert(alias, stream));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if let Some(deadline) = deadline {
                        if std::time::Instant::now() >= deadline {
                            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "accept timed out"));
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Symmetric with [`TcpServer::accept_connection`]: close and drop
    /// a previously accepted connection by alias.
    pub fn close_connection(&mut self, alias: Option<&str>) -> Result<()> {
        self.connections.remove(alias)?;
        Ok(())
    }

    pub fn send(&mut self, alias: Option<&str>, data: &[u8]) -> Result<usize> {
        use std::io::Write;
        let stream = self.connections.get_mut(alias)?;
        stream.write(data).context(super::IoSnafu)
    }

    pub fn receive_on(&mut self, alias: Option<&str>, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        receive_from(self.connections.get_mut(alias).map_err(to_io_error)?, timeout)
    }
}

fn to_io_error(e: NetError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string())
}

fn receive_from(stream: &mut TcpStream, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    stream.set_read_timeout(timeout)?;
    let mut buf = vec![0u8; TCP_BUFFER_SIZE];
    match stream.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Receive on a client's most-recently-opened (or explicitly aliased)
/// connection.
impl Transport for TcpClient {
    fn receive(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        self.receive_on(None, timeout)
    }
}

/// Receive on a server's most-recently-accepted (or explicitly
/// aliased) connection.
impl Transport for TcpServer {
    fn receive(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        self.receive_on(None, timeout)
    }
}
