//! Exact-size buffered reads over a [`crate::net::Transport`], with the
//! timeout vocabulary carried over from the scripting layer this crate
//! replaces: `None`/empty/`"none"` means a default wait, `"blocking"`
//! means no timeout at all, and anything else is a second count.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use snafu::{ensure, ResultExt, Snafu};
use tracing::debug;

use crate::net::Transport;

/// Default timeout applied when a caller passes `None`, `""`, or
/// `"none"` and does not otherwise specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum StreamError {
    #[snafu(display("timed out waiting for {} more byte(s)", needed))]
    TimedOut { needed: usize },

    #[snafu(display("invalid timeout value `{}`", value))]
    InvalidTimeout { value: String },

    #[snafu(display("transport error"))]
    Transport { source: std::io::Error },
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// A parsed timeout, as accepted by [`BufferedStream::read`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timeout {
    /// Wait forever for the requested data to arrive.
    Blocking,
    /// Give up once this much wall-clock time has elapsed.
    After(Duration),
}

impl Timeout {
    /// Parse a timeout the way the original scripting keyword did:
    /// blank/`"none"` selects [`DEFAULT_TIMEOUT`], `"blocking"` disables
    /// the deadline entirely, and any other string is a second count
    /// (fractional seconds allowed).
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Timeout::After(DEFAULT_TIMEOUT)),
            Some(v) if v.eq_ignore_ascii_case("none") => Ok(Timeout::After(DEFAULT_TIMEOUT)),
            Some(v) if v.eq_ignore_ascii_case("blocking") => Ok(Timeout::Blocking),
            Some(v) => v
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .map(Timeout::After)
                .ok_or_else(|| StreamError::InvalidTimeout { value: v.to_string() }),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::After(DEFAULT_TIMEOUT)
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

/// Buffers bytes received from a [`Transport`] so that callers can read
/// an exact byte count, spanning as many underlying receives as needed
/// within the given [`Timeout`].
pub struct BufferedStream<T: Transport> {
    transport: T,
    buffer: BytesMut,
}

impl<T: Transport> BufferedStream<T> {
    pub fn new(transport: T) -> Self {
        BufferedStream {
            transport,
            buffer: BytesMut::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Read exactly `size` bytes, receiving more from the transport as
    /// needed until either enough data has accumulated or `timeout`
    /// elapses.
    pub fn read(&mut self, size: usize, timeout: Timeout) -> Result<Vec<u8>> {
        let deadline = match timeout {
            Timeout::Blocking => None,
            Timeout::After(d) => Some(Instant::now() + d),
        };

        while self.buffer.len() < size {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            ensure!(
                remaining.map(|r| !r.is_zero()).unwrap_or(true),
                TimedOutSnafu { needed: size - self.buffer.len() }
            );
            let chunk = self.transport.receive(remaining).context(TransportSnafu)?;
            if chunk.is_empty() {
                ensure!(
                    deadline.map(|d| Instant::now() < d).unwrap_or(true),
                    TimedOutSnafu { needed: size - self.buffer.len() }
                );
                continue;
            }
            debug!(bytes = chunk.len(), "received from transport");
            self.buffer.extend_from_slice(&chunk);
        }

        Ok(self.buffer.split_to(size).to_vec())
    }

    /// Drop every buffered byte that hasn't yet been consumed by
    /// [`BufferedStream::read`].
    pub fn empty(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeTransport {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Transport for FakeTransport {
        fn receive(&mut self, _timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }
    }

    #[test]
    fn reads_exact_size_across_chunks() {
        let transport = FakeTransport {
            chunks: VecDeque::from([vec![1, 2], vec![3, 4, 5]]),
        };
        let mut stream = BufferedStream::new(transport);
        let data = stream.read(4, Timeout::After(Duration::from_millis(50))).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        let rest = stream.read(1, Timeout::After(Duration::from_millis(50))).unwrap();
        assert_eq!(rest, vec![5]);
    }

    #[test]
    fn times_out_when_data_never_arrives() {
        let transport = FakeTransport { chunks: VecDeque::new() };
        let mut stream = BufferedStream::new(transport);
        let err = stream.read(1, Timeout::After(Duration::from_millis(10)));
        assert!(matches!(err, Err(StreamError::TimedOut { .. })));
    }

    #[test]
    fn parses_timeout_keywords() {
        assert_eq!(Timeout::parse(None).unwrap(), Timeout::After(DEFAULT_TIMEOUT));
        assert_eq!(Timeout::parse(Some("")).unwrap(), Timeout::After(DEFAULT_TIMEOUT));
        assert_eq!(Timeout::parse(Some("none")).unwrap(), Timeout::After(DEFAULT_TIMEOUT));
        assert_eq!(Timeout::parse(Some("blocking")).unwrap(), Timeout::Blocking);
        assert_eq!(Timeout::parse(Some("2.5")).unwrap(), Timeout::After(Duration::from_secs_f64(2.5)));
        assert!(Timeout::parse(Some("nope")).is_err());
    }

    #[test]
    fn empty_drops_buffered_bytes() {
        let transport = FakeTransport {
            chunks: VecDeque::from([vec![1, 2, 3]]),
        };
        let mut stream = BufferedStream::new(transport);
        let _ = stream.read(1, Timeout::After(Duration::from_millis(50))).unwrap();
        stream.empty();
        assert!(stream.buffer.is_empty());
    }
}
