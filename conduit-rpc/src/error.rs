//! Maps every lower-layer error onto a JSON-RPC error code (spec.md §7).
//! This is the only place in the workspace that hardcodes a wire code —
//! `conduit-core`/`conduit-store` stay wire-format agnostic.

use thiserror::Error;

use crate::protocol::RpcErrorBody;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Engine(#[from] conduit_core::EngineError),
    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub const CODE_PARSE_ERROR: i64 = -32700;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_INTERNAL_ERROR: i64 = -32603;
pub const CODE_SESSION_NOT_FOUND: i64 = -32000;
pub const CODE_AGENT_BUSY: i64 = -32001;
pub const CODE_CONTEXT_OVERFLOW: i64 = -32002;

impl RpcError {
    pub fn to_body(&self) -> RpcErrorBody {
        let code = match self {
            RpcError::ParseError(_) => CODE_PARSE_ERROR,
            RpcError::MethodNotFound(_) => CODE_METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => CODE_INVALID_PARAMS,
            RpcError::Engine(conduit_core::EngineError::SessionNotFound(_)) => CODE_SESSION_NOT_FOUND,
            RpcError::Engine(conduit_core::EngineError::AgentBusy(_)) => CODE_AGENT_BUSY,
            RpcError::Engine(conduit_core::EngineError::ContextOverflow { .. }) => CODE_CONTEXT_OVERFLOW,
            RpcError::Engine(_) => CODE_INTERNAL_ERROR,
            RpcError::Serialization(_) => CODE_INTERNAL_ERROR,
        };
        RpcErrorBody {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_32000() {
        let err = RpcError::Engine(conduit_core::EngineError::SessionNotFound("s1".to_string()));
        assert_eq!(err.to_body().code, CODE_SESSION_NOT_FOUND);
    }

    #[test]
    fn agent_busy_maps_to_32001() {
        let err = RpcError::Engine(conduit_core::EngineError::AgentBusy("s1".to_string()));
        assert_eq!(err.to_body().code, CODE_AGENT_BUSY);
    }

    #[test]
    fn unknown_method_maps_to_32601() {
        let err = RpcError::MethodNotFound("bogus.method".to_string());
        assert_eq!(err.to_body().code, CODE_METHOD_NOT_FOUND);
    }
}
