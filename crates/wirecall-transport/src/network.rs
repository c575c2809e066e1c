use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Network kinds accepted by [`dial`](crate::dial) and
/// [`Listener::bind`](crate::Listener::bind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// TCP over IPv4 or IPv6, whichever the address resolves to.
    Tcp,
    /// TCP restricted to IPv4 addresses.
    Tcp4,
    /// TCP restricted to IPv6 addresses.
    Tcp6,
    /// Filesystem-path Unix domain socket.
    Unix,
}

impl Network {
    /// Canonical name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
        }
    }

    /// Whether this network is one of the TCP variants.
    pub fn is_tcp(self) -> bool {
        !matches!(self, Network::Unix)
    }

    pub(crate) fn accepts(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
            Network::Unix => false,
        }
    }
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            other => Err(TransportError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
