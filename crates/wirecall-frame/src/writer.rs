use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use wirecall_transport::Stream;

use crate::codec::{encode_message_into, FrameConfig, PREFIX_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Each frame goes out as one contiguous buffer. Callers sharing a stream
/// between threads must still serialize calls to the writer.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete message (blocking).
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        self.buf.clear();
        encode_message_into(msg, &mut self.buf)?;

        let total = self.buf.len() - PREFIX_SIZE;
        if total > self.config.max_frame_size {
            self.buf.clear();
            return Err(FrameError::FrameTooLarge {
                size: total,
                max: self.config.max_frame_size,
            });
        }

        let buf = std::mem::take(&mut self.buf);
        let res = self.write_all_retrying(&buf);
        self.buf = buf;
        res?;
        self.flush()
    }

    /// Write an already encoded frame as-is.
    pub fn write_encoded(&mut self, frame: &[u8]) -> Result<()> {
        self.write_all_retrying(frame)?;
        self.flush()
    }

    fn write_all_retrying(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(write_error(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(write_error(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent writes.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<Stream> {
    /// Create a frame writer for a transport stream and apply the write
    /// timeout from config.
    pub fn with_config_stream(inner: Stream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

/// An expired `SO_SNDTIMEO` surfaces as `WouldBlock` on Unix and
/// `TimedOut` on Windows.
fn write_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => FrameError::WriteTimeout,
        _ => FrameError::Io(err),
    }
}
