//! Multiplexed RPC over a compact binary framing protocol.
//!
//! A client issues named calls (`Service.Method`) over one persistent
//! connection and receives correlated replies; a server dispatches each
//! request to a registered handler and answers on the same connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix domain socket streams
//! - [`frame`]: Wire format: magic, lengths, serialized header, opaque body
//! - [`rpc`]: Call multiplexer client, service registry and dispatcher
//!
//! The most used types are also re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use wirecall_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wirecall_frame::*;
}

/// Re-export client and server types.
pub mod rpc {
    pub use wirecall_rpc::*;
}

pub use wirecall_rpc::{
    Call, Client, ClientConfig, Codec, Completion, Context, JsonCodec, MsgPackCodec, RequestContext,
    RpcError, Server, ServerConfig, Service,
};
