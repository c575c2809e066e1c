//! Self-delimiting binary framing for wirecall messages.
//!
//! Every message on the wire is laid out as (numbers big-endian):
//! - 2-byte magic `0xAB 0xBA`
//! - 1-byte protocol version (written, not validated on decode)
//! - 4-byte total length: header-length field + header + body
//! - 4-byte header length
//! - the serialized [`Header`]
//! - the opaque body
//!
//! The body is produced by a payload codec one layer up and is never
//! interpreted here.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_message, encode_message, encode_message_into, FrameConfig, DEFAULT_MAX_FRAME_SIZE,
    MAGIC, PREFIX_SIZE, PROTOCOL_VERSION,
};
pub use error::{FrameError, Result};
pub use message::{
    format_timeout, parse_timeout, Header, Message, MessageType, REQUEST_TIMEOUT_KEY,
    STATUS_ERROR, STATUS_OK,
};
pub use reader::{read_message, FrameReader};
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
