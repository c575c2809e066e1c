use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::message::{Header, Message};

/// Magic bytes opening every frame.
pub const MAGIC: [u8; 2] = [0xAB, 0xBA];

/// Version byte written into every frame. Decoding does not check it.
pub const PROTOCOL_VERSION: u8 = 0;

/// Fixed prefix: magic (2) + version (1) + total length (4) = 7 bytes.
/// The total length does not count these bytes.
pub const PREFIX_SIZE: usize = 7;

/// Size of the header-length field at the start of the length-counted blob.
pub(crate) const HEADER_LEN_SIZE: usize = 4;

/// Default maximum total length of a frame: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a message into a freshly allocated frame.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬──────────────┬──────────────┬──────────┬──────┐
/// │ Magic (2B) │ Version │ Total length │ Header len   │ Header   │ Body │
/// │ 0xAB 0xBA  │ (1B)    │ (4B BE)      │ (4B BE)      │ (JSON)   │      │
/// └────────────┴─────────┴──────────────┴──────────────┴──────────┴──────┘
///                         total length = 4 + header len + body len
/// ```
pub fn encode_message(msg: &Message) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_message_into(msg, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a message, appending the frame to `dst`.
///
/// The header is serialized first to learn its length; the frame is then
/// written with a single reservation.
pub fn encode_message_into(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    let header = serde_json::to_vec(&msg.header)?;
    let total = HEADER_LEN_SIZE + header.len() + msg.body.len();
    if total > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(PREFIX_SIZE + total);
    dst.put_slice(&MAGIC);
    dst.put_u8(PROTOCOL_VERSION);
    dst.put_u32(total as u32);
    dst.put_u32(header.len() as u32);
    dst.put_slice(&header);
    dst.put_slice(&msg.body);
    Ok(())
}

/// Decode one message from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete frame yet. Bad
/// magic is reported as soon as two bytes are buffered and a bad total
/// length as soon as the prefix is. On success, consumes the frame bytes.
pub fn decode_message(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Message>> {
    if src.len() < MAGIC.len() {
        return Ok(None);
    }
    check_magic([src[0], src[1]])?;

    if src.len() < PREFIX_SIZE {
        return Ok(None);
    }
    let version = src[2];
    let total = check_total_length(
        u32::from_be_bytes([src[3], src[4], src[5], src[6]]),
        max_frame_size,
    )?;

    if src.len() < PREFIX_SIZE + total {
        return Ok(None);
    }

    src.advance(PREFIX_SIZE);
    let blob = src.split_to(total).freeze();
    parse_blob(blob, version).map(Some)
}

pub(crate) fn check_magic(magic: [u8; 2]) -> Result<()> {
    if magic == MAGIC {
        Ok(())
    } else {
        Err(FrameError::InvalidMagic(magic))
    }
}

/// Validate the total-length field and convert it to a byte count.
pub(crate) fn check_total_length(total: u32, max_frame_size: usize) -> Result<usize> {
    if (total as usize) < HEADER_LEN_SIZE {
        return Err(FrameError::InvalidTotalLength(total));
    }
    if total as usize > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: total as usize,
            max: max_frame_size,
        });
    }
    Ok(total as usize)
}

/// Split the length-counted blob into header and body.
pub(crate) fn parse_blob(blob: Bytes, version: u8) -> Result<Message> {
    let available = blob.len() - HEADER_LEN_SIZE;
    let header_len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]);
    if header_len as usize > available {
        return Err(FrameError::InvalidHeaderLength {
            header_len,
            available: available as u32,
        });
    }

    let body_start = HEADER_LEN_SIZE + header_len as usize;
    let header: Header = serde_json::from_slice(&blob[HEADER_LEN_SIZE..body_start])?;
    trace!(
        version,
        seq = header.seq,
        header_len,
        body_len = blob.len() - body_start,
        "decoded frame"
    );

    Ok(Message {
        header,
        body: blob.slice(body_start..),
    })
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum total length of one frame in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout applied to the underlying stream.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout applied to the underlying stream.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
