//! Request/response shapes that cross the provider trait boundary.

use conduit_protocol::message::{ContentBlock, Message, TokenUsage};
use serde::{Deserialize, Serialize};

/// A request to run one model turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One increment of a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    TextDelta(String),
    ThinkingDelta(String),
    ToolUseStart { id: String, name: String },
    ToolUseInputDelta { id: String, partial_json: String },
    /// Terminal delta. Carries the final assembled content blocks, the stop
    /// reason, and usage tagged with the provider that produced it.
    Done {
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: ProviderUsage,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Refusal,
    ModelContextWindowExceeded,
}

/// Token usage tagged with the provider and model that produced it, so a
/// pluggable cost function can be dispatched on `provider`/`model` alone.
#[derive(Debug, Clone)]
pub struct ProviderUsage {
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub supports_tools: bool,
    pub supports_thinking: bool,
}
