use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::network::Network;
use crate::stream::Stream;
#[cfg(unix)]
use crate::uds::{SocketCleanup, UnixDomainSocket};

/// Connect to `addr` on the given network (blocking).
///
/// For TCP networks `addr` is `host:port`; every resolved address of the
/// requested family is tried in order. For `unix` it is a socket path.
pub fn dial(network: &str, addr: &str) -> Result<Stream> {
    let network: Network = network.parse()?;
    match network {
        Network::Unix => dial_unix(addr),
        tcp => {
            let candidates = resolve(tcp, addr).map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
            let mut last_err = None;
            for candidate in candidates {
                match TcpStream::connect(candidate) {
                    Ok(stream) => {
                        debug!(%network, %candidate, "connected");
                        return Ok(Stream::from_tcp(stream));
                    }
                    Err(err) => last_err = Some(err),
                }
            }
            Err(TransportError::Connect {
                addr: addr.to_string(),
                source: last_err.unwrap_or_else(|| no_address(tcp, addr)),
            })
        }
    }
}

#[cfg(unix)]
fn dial_unix(addr: &str) -> Result<Stream> {
    UnixDomainSocket::connect(addr)
}

#[cfg(not(unix))]
fn dial_unix(addr: &str) -> Result<Stream> {
    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix domain sockets are not available on this platform",
        ),
    })
}

fn resolve(network: Network, addr: &str) -> std::io::Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()?
        .filter(|candidate| network.accepts(candidate))
        .collect();
    if candidates.is_empty() {
        return Err(no_address(network, addr));
    }
    Ok(candidates)
}

fn no_address(network: Network, addr: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!("no {network} address for {addr}"),
    )
}

/// A bound listener producing connected [`Stream`]s.
pub struct Listener {
    inner: ListenerInner,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind and listen on `addr` for the given network.
    ///
    /// Binding TCP port `0` picks a free port; read it back with
    /// [`Listener::local_addr`].
    pub fn bind(network: &str, addr: &str) -> Result<Self> {
        let network: Network = network.parse()?;
        let inner = match network {
            #[cfg(unix)]
            Network::Unix => ListenerInner::Unix(UnixDomainSocket::bind(addr)?),
            #[cfg(not(unix))]
            Network::Unix => {
                return Err(TransportError::Bind {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix domain sockets are not available on this platform",
                    ),
                })
            }
            tcp => {
                let bind_err = |source| TransportError::Bind {
                    addr: addr.to_string(),
                    source,
                };
                let candidates = resolve(tcp, addr).map_err(bind_err)?;
                let listener = TcpListener::bind(candidates.as_slice()).map_err(bind_err)?;
                info!(%network, addr = %local_tcp_addr(&listener), "listening");
                ListenerInner::Tcp(listener)
            }
        };
        Ok(Self { inner })
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
                debug!(%peer, "accepted tcp connection");
                Ok(Stream::from_tcp(stream))
            }
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.accept(),
        }
    }

    /// The address actually bound: `ip:port` for TCP, the path for `unix`.
    pub fn local_addr(&self) -> String {
        match &self.inner {
            ListenerInner::Tcp(listener) => local_tcp_addr(listener),
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.path().display().to_string(),
        }
    }

    /// For `unix` listeners, a handle that removes the socket file without
    /// dropping the listener.
    #[cfg(unix)]
    pub fn socket_cleanup(&self) -> Option<SocketCleanup> {
        match &self.inner {
            ListenerInner::Tcp(_) => None,
            ListenerInner::Unix(socket) => socket.cleanup(),
        }
    }

    /// The network this listener was bound on.
    pub fn network(&self) -> Network {
        match &self.inner {
            ListenerInner::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            ListenerInner::Unix(_) => Network::Unix,
        }
    }
}

fn local_tcp_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "tcp:unknown".to_string())
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("network", &self.network())
            .field("addr", &self.local_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::thread;

    use super::*;

    #[test]
    fn tcp_listen_dial_roundtrip() {
        let listener = Listener::bind("tcp", "127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        assert!(!addr.ends_with(":0"));

        let server = thread::spawn(move || {
            let mut stream = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut client = dial("tcp", &addr).unwrap();
        client.write_all(b"ping").unwrap();
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"ping");

        server.join().unwrap();
    }

    #[test]
    fn tcp6_rejects_ipv4_address() {
        let err = Listener::bind("tcp6", "127.0.0.1:0").unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn unsupported_network_is_rejected() {
        assert!(matches!(
            dial("udp", "127.0.0.1:1"),
            Err(TransportError::UnsupportedNetwork(_))
        ));
        assert!(matches!(
            Listener::bind("pipe", "x"),
            Err(TransportError::UnsupportedNetwork(_))
        ));
    }

    #[test]
    fn dial_refused_reports_connect_error() {
        let listener = Listener::bind("tcp", "127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        drop(listener);

        let err = dial("tcp", &addr).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn shutdown_unblocks_reader_on_clone() {
        let listener = Listener::bind("tcp", "127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let server = thread::spawn(move || listener.accept().unwrap());

        let client = dial("tcp", &addr).unwrap();
        let _server_side = server.join().unwrap();

        let mut reader = client.try_clone().unwrap();
        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        client.shutdown().unwrap();
        let read = blocked.join().unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[test]
    #[cfg(unix)]
    fn unix_listen_dial_roundtrip() {
        let dir = std::env::temp_dir().join(format!("wirecall-listener-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("l.sock");
        let path_str = path.display().to_string();

        let listener = Listener::bind("unix", &path_str).unwrap();
        assert_eq!(listener.network(), Network::Unix);
        assert_eq!(listener.local_addr(), path_str);

        let server = thread::spawn(move || {
            let mut stream = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = dial("unix", &path_str).unwrap();
        client.write_all(b"ok").unwrap();
        assert_eq!(&server.join().unwrap(), b"ok");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
