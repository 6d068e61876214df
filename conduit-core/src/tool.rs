//! The `Tool` trait boundary (spec §4.9). Concrete tool implementations
//! (filesystem, shell, browser) live outside this crate's scope; only the
//! trait and an echo double for tests live here.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How a tool may be scheduled relative to others dispatched from the same
/// assistant message (SPEC_FULL.md §4.5's wave-building algorithm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    /// Tools sharing a group id never run in the same wave.
    Serialized(u32),
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub execution_mode: ExecutionMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),
    #[error("tool call was cancelled")]
    Cancelled,
    #[error("tool execution failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn call(
        &self,
        arguments: serde_json::Value,
        cancellation: CancellationToken,
    ) -> Result<ToolOutcome, ToolError>;
}

/// Round-trips its input as the result. Used to exercise the orchestrator's
/// dispatch/wave logic without a real tool implementation.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".to_string(),
            description: "returns its input unchanged".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            }),
            execution_mode: ExecutionMode::Parallel,
            timeout: Duration::from_secs(5),
        }
    }

    async fn call(
        &self,
        arguments: serde_json::Value,
        _cancellation: CancellationToken,
    ) -> Result<ToolOutcome, ToolError> {
        let text = arguments
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".to_string()))?;
        Ok(ToolOutcome {
            content: text.to_string(),
            is_error: false,
        })
    }
}
