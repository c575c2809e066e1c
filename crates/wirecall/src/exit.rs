use std::fmt;

use wirecall_rpc::RpcError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    let code = match &err {
        RpcError::Remote(_) => FAILURE,
        RpcError::Timeout => TIMEOUT,
        RpcError::Transport(_) | RpcError::ConnectionClosed => TRANSPORT_ERROR,
        RpcError::Frame(_) | RpcError::Codec(_) => DATA_INVALID,
        RpcError::InvalidServiceMethod(_) => USAGE,
        RpcError::DuplicateService(_)
        | RpcError::DuplicateMethod { .. }
        | RpcError::NoMethods(_)
        | RpcError::InvalidServiceName(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_map_to_exit_codes() {
        let cases = [
            (RpcError::Remote("boom".to_string()), FAILURE),
            (RpcError::Timeout, TIMEOUT),
            (RpcError::ConnectionClosed, TRANSPORT_ERROR),
            (RpcError::Transport("refused".to_string()), TRANSPORT_ERROR),
            (RpcError::Codec("bad".to_string()), DATA_INVALID),
            (RpcError::InvalidServiceMethod("x".to_string()), USAGE),
            (RpcError::NoMethods("x".to_string()), INTERNAL),
        ];
        for (err, code) in cases {
            assert_eq!(rpc_error("call failed", err).code, code);
        }
    }

    #[test]
    fn message_carries_context() {
        let err = rpc_error("call failed", RpcError::Remote("boom".to_string()));
        assert_eq!(err.to_string(), "call failed: boom");
    }
}
