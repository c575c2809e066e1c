use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metadata key carrying the client's configured per-call timeout.
pub const REQUEST_TIMEOUT_KEY: &str = "rpc_request_timeout";

/// Status code of a successful message.
pub const STATUS_OK: u8 = 0;
/// Status code of a response whose `error` text is populated.
pub const STATUS_ERROR: u8 = 1;

/// Whether a message is a call or the reply to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageType {
    #[default]
    Request,
    Response,
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Request => 0,
            MessageType::Response => 1,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

/// Structured message header, serialized separately from the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Correlates a request with its response. Unique among in-flight calls
    /// on one connection.
    pub seq: u64,
    pub message_type: MessageType,
    pub compress_type: u8,
    /// Identifies the payload codec that produced the body.
    pub serialize_type: u8,
    pub status_code: u8,
    pub service_name: String,
    pub method_name: String,
    /// Empty on success.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One unit of wire exchange: a header plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: Bytes,
}

impl Message {
    /// A request for `service.method` carrying an encoded argument body.
    pub fn request(
        seq: u64,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            header: Header {
                seq,
                message_type: MessageType::Request,
                service_name: service_name.into(),
                method_name: method_name.into(),
                ..Header::default()
            },
            body: body.into(),
        }
    }

    /// A successful response to `request` carrying an encoded result body.
    pub fn response_to(request: &Header, body: impl Into<Bytes>) -> Self {
        Self {
            header: Header {
                seq: request.seq,
                message_type: MessageType::Response,
                compress_type: request.compress_type,
                serialize_type: request.serialize_type,
                status_code: STATUS_OK,
                service_name: request.service_name.clone(),
                method_name: request.method_name.clone(),
                error: String::new(),
                metadata: HashMap::new(),
            },
            body: body.into(),
        }
    }

    /// A failed response to `request`: populated error text, empty body.
    pub fn error_response_to(request: &Header, error: impl Into<String>) -> Self {
        let mut msg = Self::response_to(request, Bytes::new());
        msg.header.status_code = STATUS_ERROR;
        msg.header.error = error.into();
        msg
    }

    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    /// Whether the header carries error text.
    pub fn is_error(&self) -> bool {
        !self.header.error.is_empty()
    }
}

/// Render a timeout the way it is advertised in request metadata
/// (`1.5s`, `250ms`, `10µs`).
pub fn format_timeout(timeout: Duration) -> String {
    format!("{timeout:?}")
}

/// Parse a timeout rendered by [`format_timeout`].
///
/// Accepts a non-negative decimal followed by `ns`, `us`, `µs`, `ms` or `s`.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    // Scale to whole nanoseconds so `10µs` does not come back as 9.999µs.
    let (number, nanos_per_unit) = if let Some(n) = value.strip_suffix("ns") {
        (n, 1.0)
    } else if let Some(n) = value
        .strip_suffix("µs")
        .or_else(|| value.strip_suffix("us"))
    {
        (n, 1e3)
    } else if let Some(n) = value.strip_suffix("ms") {
        (n, 1e6)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1e9)
    } else {
        return None;
    };

    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    let nanos = (number * nanos_per_unit).round();
    if nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}
