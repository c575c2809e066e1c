use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// `serialize_type` tag written by [`JsonCodec`].
pub const SERIALIZE_JSON: u8 = 0;

/// `serialize_type` tag written by [`MsgPackCodec`].
pub const SERIALIZE_MSGPACK: u8 = 1;

/// Payload codec: turns call arguments and results into body bytes.
///
/// Independent of header encoding. Swapping the codec never touches the
/// framing layer; both ends of a connection must agree on it.
pub trait Codec: Send + Sync + 'static {
    type Error: Display;

    /// Tag written into each request header's `serialize_type`.
    fn serialize_type(&self) -> u8;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Self::Error>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// JSON payload codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn serialize_type(&self) -> u8 {
        SERIALIZE_JSON
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Errors from [`MsgPackCodec`].
#[derive(Debug, thiserror::Error)]
pub enum MsgPackError {
    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),
}

/// MessagePack payload codec backed by `rmp-serde`.
///
/// Structs are written as maps keyed by field name, so peers may add or
/// reorder fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    type Error = MsgPackError;

    fn serialize_type(&self) -> u8 {
        SERIALIZE_MSGPACK
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        msg: String,
    }

    #[test]
    fn json_encodes_compactly() {
        let body = JsonCodec
            .encode(&Ping {
                msg: "hi".to_string(),
            })
            .unwrap();
        assert_eq!(body, br#"{"msg":"hi"}"#);
    }

    #[test]
    fn json_decode_reports_shape_errors() {
        let err = JsonCodec.decode::<Ping>(br#"{"message":"hi"}"#).unwrap_err();
        assert!(err.to_string().contains("missing field `msg`"));
    }

    #[test]
    fn msgpack_writes_named_fields() {
        let body = MsgPackCodec
            .encode(&Ping {
                msg: "hi".to_string(),
            })
            .unwrap();
        // fixmap(1), fixstr "msg", fixstr "hi"
        assert_eq!(body, b"\x81\xa3msg\xa2hi");
        let back: Ping = MsgPackCodec.decode(&body).unwrap();
        assert_eq!(back.msg, "hi");
    }

    #[test]
    fn msgpack_decode_reports_errors() {
        let err = MsgPackCodec.decode::<Ping>(b"\xc1").unwrap_err();
        assert!(matches!(err, MsgPackError::Decode(_)));
    }

    #[test]
    fn codecs_carry_distinct_tags() {
        assert_ne!(JsonCodec.serialize_type(), MsgPackCodec.serialize_type());
    }
}
