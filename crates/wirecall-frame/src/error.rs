/// Errors that can occur during frame encoding/decoding.
///
/// Every decode error is fatal for the stream it came from: once a frame is
/// rejected, byte alignment can no longer be trusted.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame starts with something other than `0xAB 0xBA`.
    #[error("invalid frame magic {0:02x?} (expected [ab, ba])")]
    InvalidMagic([u8; 2]),

    /// The total length cannot even hold the header-length field.
    #[error("invalid total length {0} (minimum 4)")]
    InvalidTotalLength(u32),

    /// The header length points past the end of the frame.
    #[error("invalid header length {header_len} (frame has {available} bytes after the length field)")]
    InvalidHeaderLength { header_len: u32, available: u32 },

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The header bytes could not be serialized or parsed.
    #[error("header codec error: {0}")]
    Header(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write did not complete within the stream's write timeout. Part of
    /// the frame may already be on the wire.
    #[error("frame write timed out")]
    WriteTimeout,

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl From<wirecall_transport::TransportError> for FrameError {
    fn from(err: wirecall_transport::TransportError) -> Self {
        use wirecall_transport::TransportError;
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                FrameError::Io(source)
            }
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
