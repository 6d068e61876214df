//! The error taxonomy the Turn Orchestrator, Context Manager, and Subagent
//! Tracker surface. The RPC Coordinator is the only layer that maps these
//! onto JSON-RPC error codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("a turn is already in flight for session {0}")]
    AgentBusy(String),

    #[error("context window exceeded for model {model}: {estimated_tokens} tokens against a {limit} limit")]
    ContextOverflow {
        model: String,
        estimated_tokens: i64,
        limit: i64,
    },

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("provider error: {0}")]
    Provider(#[from] conduit_providers::ProviderError),

    #[error("store error: {0}")]
    Store(#[from] conduit_store::StoreError),

    #[error("hook denied the call: {0}")]
    HookDenied(#[from] conduit_hooks::HookError),

    #[error("subagent nesting exceeded max depth {max_depth}")]
    MaxDepthExceeded { max_depth: u32 },

    #[error("tool '{0}' is not permitted in this context: {1}")]
    ToolNotPermitted(String, String),

    #[error("turn was cancelled")]
    Cancelled,
}
