//! UDP client and server transports.
//!
//! UDP is connectionless: there is exactly one socket per client or
//! server, so aliasing multiple named connections makes no sense here
//! the way it does for [`crate::net::tcp`].

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::debug;

use super::Transport;
use crate::message::{Message, MessageError, MessageTemplate};
use crate::protocol::ProtocolError;
use crate::stream::{BufferedStream, Timeout};

/// Matches the scripting layer's UDP receive buffer size.
pub const UDP_BUFFER_SIZE: usize = 65_536;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum UdpError {
    #[snafu(display("named aliases are not supported by UDP transports"))]
    AliasNotSupported,

    #[snafu(display("no client has sent data to this server yet"))]
    NoClient,

    #[snafu(display("I/O error"))]
    Io { source: std::io::Error },

    #[snafu(display("failed to read a full message from the socket"))]
    GetMessage { source: ProtocolError },

    #[snafu(display("failed to decode message"))]
    Decode { source: MessageError },
}

pub type Result<T, E = UdpError> = std::result::Result<T, E>;

/// A UDP client bound to a single remote peer.
pub struct UdpClient {
    socket: UdpSocket,
}

impl UdpClient {
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context(IoSnafu)?;
        socket.connect(address).context(IoSnafu)?;
        Ok(UdpClient { socket })
    }

    /// Send on the client's single socket. `alias` exists only so this
    /// mirrors [`crate::net::tcp::TcpClient::send`]'s signature; any
    /// value other than `None` is rejected, since a UDP client has no
    /// concept of multiple named connections.
    pub fn send(&self, alias: Option<&str>, data: &[u8]) -> Result<usize> {
        ensure!(alias.is_none(), AliasNotSupportedSnafu);
        self.socket.send(data).context(IoSnafu)
    }

    /// Read one complete message off the socket and decode it against
    /// `template`, tying `Protocol::get_message_stream`'s framing to
    /// `MessageTemplate::decode` the way a test script would otherwise
    /// have to hand-wire itself. Each call frames against a fresh
    /// `BufferedStream` over a cloned handle to the same socket, which
    /// is enough for UDP: one `recv` yields one whole datagram.
    pub fn get_message(&self, template: &MessageTemplate, timeout: Timeout) -> Result<Message> {
        let socket = self.socket.try_clone().context(IoSnafu)?;
        let mut stream = BufferedStream::new(UdpClient { socket });
        let raw = template
            .protocol
            .get_message_stream(&mut stream, timeout)
            .context(GetMessageSnafu)?;
        template.decode(&raw).context(DecodeSnafu)
    }
}

impl Transport for UdpClient {
    fn receive(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        self.socket.set_read_timeout(timeout)?;
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                debug!(bytes = n, "udp client received");
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// A UDP server bound to a local port, tracking the most recent sender
/// so replies can be addressed back to it.
pub struct UdpServer {
    socket: UdpSocket,
    last_client: Option<SocketAddr>,
}

impl UdpServer {
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(address).context(IoSnafu)?;
        Ok(UdpServer {
            socket,
            last_client: None,
        })
    }

    pub fn last_client(&self) -> Option<SocketAddr> {
        self.last_client
    }

    /// Reply to whichever client most recently sent this server data.
    /// `alias` is rejected unless `None`: a UDP server has no named
    /// connections to choose among, only "the last sender".
    pub fn send_to_last(&self, alias: Option<&str>, data: &[u8]) -> Result<usize> {
        ensure!(alias.is_none(), AliasNotSupportedSnafu);
        let target = self.last_client.context(NoClientSnafu)?;
        self.socket.send_to(data, target).context(IoSnafu)
    }
}

impl Transport for UdpServer {
    fn receive(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        self.socket.set_read_timeout(timeout)?;
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                buf.truncate(n);
                self.last_client = Some(from);
                debug!(bytes = n, peer = %from, "udp server received");
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
