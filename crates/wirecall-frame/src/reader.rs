use std::io::{ErrorKind, Read};

use bytes::Bytes;
use wirecall_transport::Stream;

use crate::codec::{check_magic, check_total_length, parse_blob, FrameConfig, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Read one message from a blocking stream with the default size limit.
///
/// See [`FrameReader::read_message`].
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    read_staged(reader, DEFAULT_MAX_FRAME_SIZE)
}

/// Reads complete messages from any `Read` stream.
///
/// Reads are exact: the reader never consumes bytes past the end of the
/// frame it is decoding, so nothing is lost when it is dropped between
/// frames.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next complete message (blocking).
    ///
    /// Reads the magic, the version byte and the total length, validates
    /// them, then reads exactly `total length` bytes. A total length below
    /// 4 fails before anything further is read.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends,
    /// whether cleanly between frames or in the middle of one.
    pub fn read_message(&mut self) -> Result<Message> {
        read_staged(&mut self.inner, self.config.max_frame_size)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent reads.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<Stream> {
    /// Create a frame reader for a transport stream and apply the read
    /// timeout from config.
    pub fn with_config_stream(inner: Stream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

fn read_staged<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Message> {
    let mut magic = [0u8; 2];
    read_full(reader, &mut magic)?;
    check_magic(magic)?;

    let mut version = [0u8; 1];
    read_full(reader, &mut version)?;

    let mut total = [0u8; 4];
    read_full(reader, &mut total)?;
    let total = check_total_length(u32::from_be_bytes(total), max_frame_size)?;

    let mut blob = vec![0u8; total];
    read_full(reader, &mut blob)?;
    parse_blob(Bytes::from(blob), version[0])
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
        Err(err) => Err(FrameError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_message_into, MAGIC, PROTOCOL_VERSION};

    fn wire_of(messages: &[Message]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for msg in messages {
            encode_message_into(msg, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn read_single_message() {
        let msg = Message::request(1, "Echo", "Ping", b"{\"msg\":\"hi\"}".to_vec());
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[msg.clone()])));

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn read_multiple_messages() {
        let msgs = vec![
            Message::request(1, "A", "one", b"1".to_vec()),
            Message::request(2, "B", "two", b"22".to_vec()),
            Message::request(3, "C", "three", Vec::new()),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire_of(&msgs)));

        for expected in &msgs {
            assert_eq!(&reader.read_message().unwrap(), expected);
        }
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn free_function_reads_one_message() {
        let msg = Message::request(9, "Echo", "Ping", b"x".to_vec());
        let mut cursor = Cursor::new(wire_of(&[msg.clone()]));
        assert_eq!(read_message(&mut cursor).unwrap(), msg);
    }

    #[test]
    fn large_body() {
        let body = vec![0xAB; 64 * 1024];
        let msg = Message::request(5, "Blob", "Put", body.clone());
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[msg])));

        assert_eq!(reader.read_message().unwrap().body.as_ref(), body.as_slice());
    }

    #[test]
    fn invalid_total_length_stops_after_prefix() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u8(PROTOCOL_VERSION);
        wire.put_u32(2);
        wire.put_slice(b"trailing bytes that must stay unread");

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_message().unwrap_err();

        assert!(matches!(err, FrameError::InvalidTotalLength(2)));
        assert!(err.to_string().contains("invalid total length"));
        assert_eq!(reader.get_ref().position(), 7);
    }

    #[test]
    fn partial_read_handling() {
        let msg = Message::request(4, "Slow", "Drip", b"slow".to_vec());
        let byte_reader = ByteByByteReader {
            bytes: wire_of(&[msg.clone()]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let wire = wire_of(&[Message::request(1, "A", "b", b"payload".to_vec())]);
        let mut reader = FrameReader::new(Cursor::new(wire[..wire.len() - 4].to_vec()));

        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x10];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic([0x00, 0x01])));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u8(PROTOCOL_VERSION);
        wire.put_u32(1024);

        let cfg = FrameConfig {
            max_frame_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 1024, max: 16 }));
    }

    #[test]
    fn set_max_frame_size_applies_to_next_read() {
        let msg = Message::request(1, "A", "b", vec![0u8; 128]);
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[msg])));
        reader.set_max_frame_size(8);
        assert_eq!(reader.config().max_frame_size, 8);
        assert!(matches!(
            reader.read_message(),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct ScriptedReader {
        first_error: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.first_error.take() {
                return Err(std::io::Error::from(kind));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let msg = Message::request(8, "A", "b", b"ok".to_vec());
        let mut reader = FrameReader::new(ScriptedReader {
            first_error: Some(ErrorKind::Interrupted),
            bytes: wire_of(&[msg.clone()]),
            pos: 0,
        });

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut reader = FrameReader::new(ScriptedReader {
            first_error: Some(ErrorKind::WouldBlock),
            bytes: wire_of(&[Message::request(7, "A", "b", Vec::new())]),
            pos: 0,
        });

        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let msg = Message::request(1, "Echo", "Ping", b"ping".to_vec());
        writer.write_message(&msg).unwrap();

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    #[cfg(unix)]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let reader = Arc::new(Mutex::new(FrameReader::new(right)));

        let reader_thread = {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || {
                for expected in 0..64u64 {
                    let msg = reader.lock().unwrap().read_message().unwrap();
                    assert_eq!(msg.seq(), expected);
                    assert_eq!(msg.body.as_ref(), format!("msg-{expected}").as_bytes());
                }
            })
        };

        for i in 0..64u64 {
            let msg = Message::request(i, "Seq", "Put", format!("msg-{i}").into_bytes());
            writer.write_message(&msg).unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn roundtrip_over_tcp_stream() {
        let listener = wirecall_transport::Listener::bind("tcp", "127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let cfg = FrameConfig {
                read_timeout: Some(std::time::Duration::from_secs(5)),
                ..FrameConfig::default()
            };
            let mut reader = FrameReader::with_config_stream(stream, cfg).unwrap();
            reader.read_message().unwrap()
        });

        let stream = wirecall_transport::dial("tcp", &addr).unwrap();
        let mut writer = crate::writer::FrameWriter::new(stream);
        let msg = Message::request(11, "Net", "Send", b"tcp".to_vec());
        writer.write_message(&msg).unwrap();

        assert_eq!(server.join().unwrap(), msg);
    }
}
