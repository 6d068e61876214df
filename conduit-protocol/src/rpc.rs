//! JSON-RPC 2.0 envelope and the coordinator's method/notification surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes plus the runtime's own reserved range.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SESSION_NOT_FOUND: i64 = -32000;
    pub const AGENT_BUSY: i64 = -32001;
    pub const CONTEXT_OVERFLOW: i64 = -32002;
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A server-initiated, unsolicited message. Carries no `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// The method names the coordinator routes (§4.7).
pub mod methods {
    pub const SESSION_CREATE: &str = "session.create";
    pub const SESSION_LIST: &str = "session.list";
    pub const SESSION_GET: &str = "session.get";
    pub const SESSION_FORK: &str = "session.fork";
    pub const SESSION_DELETE: &str = "session.delete";
    pub const SESSION_ARCHIVE: &str = "session.archive";
    pub const SESSION_UNARCHIVE: &str = "session.unarchive";
    pub const AGENT_MESSAGE: &str = "agent.message";
    pub const AGENT_ABORT: &str = "agent.abort";
    pub const AGENT_RESPOND: &str = "agent.respond";
    pub const MODEL_LIST: &str = "model.list";
    pub const MODEL_SWITCH: &str = "model.switch";
    pub const CONTEXT_GET: &str = "context.get";
    pub const CONTEXT_COMPACT: &str = "context.compact";
    pub const EVENTS_LIST: &str = "events.list";
    pub const EVENTS_SYNC: &str = "events.sync";
}

/// The notification names the coordinator pushes (§4.7).
pub mod notifications {
    pub const AGENT_TEXT_DELTA: &str = "agent.text_delta";
    pub const AGENT_THINKING_DELTA: &str = "agent.thinking_delta";
    pub const AGENT_TOOL_START: &str = "agent.tool_start";
    pub const AGENT_TOOL_END: &str = "agent.tool_end";
    pub const AGENT_TURN_COMPLETE: &str = "agent.turn_complete";
    pub const SESSION_STATUS: &str = "session.status";
    pub const SUBAGENT_SPAWN: &str = "subagent.spawn";
    pub const SUBAGENT_COMPLETE: &str = "subagent.complete";
    pub const SESSION_DELETED: &str = "session.deleted";
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentMessageParams {
    pub session_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionCreateParams {
    pub workspace_path: String,
    pub model_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionForkParams {
    pub session_id: String,
    #[serde(default)]
    pub from_event_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsSyncParams {
    pub session_id: String,
    pub last_sequence: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_absent_error() {
        let resp = RpcResponse::ok(Value::from(1), Value::from("done"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
    }

    #[test]
    fn error_response_omits_result() {
        let resp = RpcResponse::err(
            Value::from(1),
            RpcError::new(error_codes::SESSION_NOT_FOUND, "not found"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("\"result\""));
    }
}
