//! Transport backends for [`crate::stream::BufferedStream`]: UDP and
//! TCP clients and servers, each keeping a small cache of named
//! connections the way the scripting layer this crate replaces did.

pub mod tcp;
pub mod udp;

use std::time::Duration;

use snafu::OptionExt;

pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpClient, UdpServer};

/// A single logical receive operation: block for up to `timeout` (or
/// forever, if `None`) and return whatever bytes arrived, or an empty
/// vector on a timeout with no data.
pub trait Transport {
    fn receive(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, snafu::Snafu)]
#[non_exhaustive]
pub enum NetError {
    #[snafu(display("no connection named `{}`", alias))]
    UnknownAlias { alias: String },

    #[snafu(display("no connections are open"))]
    NoConnection,

    #[snafu(display("named aliases are not supported by this transport"))]
    AliasNotSupported,

    #[snafu(display("I/O error"))]
    Io { source: std::io::Error },
}

pub type Result<T, E = NetError> = std::result::Result<T, E>;

/// Maps optional caller-supplied aliases to active connections,
/// auto-naming unaliased ones `connection<n>` and treating `None` on
/// lookup as "the most recently added connection".
#[derive(Debug, Default)]
pub(crate) struct NamedCache<C> {
    entries: Vec<(String, C)>,
    next_auto: usize,
}

impl<C> NamedCache<C> {
    pub fn new() -> Self {
        NamedCache {
            entries: Vec::new(),
            next_auto: 1,
        }
    }

    /// Insert a new connection, returning the alias it was registered
    /// under (the caller-supplied one, or an auto-generated
    /// `connection<n>`).
    pub fn insert(&mut self, alias: Option<String>, connection: C) -> String {
        let alias = alias.unwrap_or_else(|| {
            let name = format!("connection{}", self.next_auto);
            self.next_auto += 1;
            name
        });
        self.entries.retain(|(existing, _)| existing != &alias);
        self.entries.push((alias.clone(), connection));
        alias
    }

    pub fn get_mut(&mut self, alias: Option<&str>) -> Result<&mut C> {
        match alias {
            Some(alias) => self
                .entries
                .iter_mut()
                .find(|(a, _)| a == alias)
                .map(|(_, c)| c)
                .context(UnknownAliasSnafu { alias: alias.to_string() }),
            None => self.entries.last_mut().map(|(_, c)| c).context(NoConnectionSnafu),
        }
    }

    pub fn remove(&mut self, alias: Option<&str>) -> Result<C> {
        let index = match alias {
            Some(alias) => self
                .entries
                .iter()
                .position(|(a, _)| a == alias)
                .context(UnknownAliasSnafu { alias: alias.to_string() })?,
            None => {
                snafu::ensure!(!self.entries.is_empty(), NoConnectionSnafu);
                self.entries.len() - 1
            }
        };
        Ok(self.entries.remove(index).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_names_unaliased_connections() {
        let mut cache: NamedCache<u32> = NamedCache::new();
        let a = cache.insert(None, 1);
        let b = cache.insert(None, 2);
        assert_eq!(a, "connection1");
        assert_eq!(b, "connection2");
    }

    #[test]
    fn none_alias_gets_most_recent() {
        let mut cache: NamedCache<u32> = NamedCache::new();
        cache.insert(Some("first".to_string()), 1);
        cache.insert(Some("second".to_string()), 2);
        assert_eq!(*cache.get_mut(None).unwrap(), 2);
        assert_eq!(*cache.get_mut(Some("first")).unwrap(), 1);
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let mut cache: NamedCache<u32> = NamedCache::new();
        cache.insert(Some("first".to_string()), 1);
        assert!(matches!(cache.get_mut(Some("missing")), Err(NetError::UnknownAlias { .. })));
    }
}
