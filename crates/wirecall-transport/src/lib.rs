//! Duplex byte-stream transport for wirecall.
//!
//! Provides one connected [`Stream`] type over the supported networks:
//! - TCP (`tcp`, `tcp4`, `tcp6`)
//! - Unix domain sockets (`unix`, Linux/macOS)
//!
//! This is the lowest layer of wirecall. The frame codec reads and writes
//! through a [`Stream`]; nothing here knows about messages or calls.

pub mod error;
pub mod listener;
pub mod network;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use listener::{dial, Listener};
pub use network::Network;
pub use stream::Stream;

#[cfg(unix)]
pub use uds::{SocketCleanup, UnixDomainSocket};
