use wirecall_frame::FrameError;
use wirecall_transport::TransportError;

/// Errors surfaced by clients, services and the server.
///
/// A call fails with exactly one of these. The type is `Clone` so a single
/// connection failure can be handed to every call still waiting on it;
/// sources that are not clonable are kept as their rendered text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Corrupt or oversized frame. Fatal for the connection it came from.
    #[error("frame error: {0}")]
    Frame(String),

    /// Argument or result could not be encoded or decoded. Fails only the
    /// affected call.
    #[error("codec error: {0}")]
    Codec(String),

    /// Error text reported by the server in the response header.
    #[error("{0}")]
    Remote(String),

    /// The caller's deadline elapsed before a response arrived.
    #[error("rpc: call timed out")]
    Timeout,

    /// Dial, read or write failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection ended while the call was outstanding, or before it
    /// was sent.
    #[error("rpc: connection closed")]
    ConnectionClosed,

    /// The target is not of the form `Service.Method`.
    #[error("rpc: service/method request ill-formed: {0:?}")]
    InvalidServiceMethod(String),

    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc: method {service}.{method} defined twice")]
    DuplicateMethod { service: String, method: String },

    #[error("rpc: service {0} has no methods")]
    NoMethods(String),

    #[error("rpc: invalid service name {0:?}")]
    InvalidServiceName(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;

impl From<FrameError> for RpcError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => RpcError::ConnectionClosed,
            FrameError::Io(io) => RpcError::Transport(io.to_string()),
            err @ FrameError::WriteTimeout => RpcError::Transport(err.to_string()),
            other => RpcError::Frame(other.to_string()),
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        RpcError::Transport(err.to_string())
    }
}
