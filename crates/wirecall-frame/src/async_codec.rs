use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, encode_message_into, DEFAULT_MAX_FRAME_SIZE, PREFIX_SIZE};
use crate::error::FrameError;
use crate::message::Message;

/// `tokio_util` codec over the wirecall frame format.
///
/// Use with `FramedRead`/`FramedWrite` (or `Framed`) on any async byte
/// stream.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame_size: usize,
}

impl MessageCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, self.max_frame_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        encode_message_into(&item, dst)?;
        let total = dst.len() - start - PREFIX_SIZE;
        if total > self.max_frame_size {
            dst.truncate(start);
            return Err(FrameError::FrameTooLarge {
                size: total,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}
