//! Client call multiplexer and server dispatcher for wirecall.
//!
//! A [`Client`] shares one connection among any number of concurrent
//! calls, correlating responses by sequence number. A [`Server`] routes
//! each request to a method of a registered [`Service`] and answers on
//! the same connection.

pub mod call;
pub mod client;
pub mod codec;
pub mod context;
pub mod error;
pub mod server;
pub mod service;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use call::{Call, Completion};
pub use client::{Client, ClientConfig};
pub use codec::{Codec, JsonCodec, MsgPackCodec, MsgPackError, SERIALIZE_JSON, SERIALIZE_MSGPACK};
pub use context::{Context, RequestContext};
pub use error::{Result, RpcError};
pub use server::{Server, ServerConfig};
pub use service::Service;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
