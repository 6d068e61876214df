//! Event types and the immutable event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use uuid::Uuid;

/// Discriminator for every event the store can hold.
///
/// New variants are added by (a) declaring the variant here, (b) updating
/// the reconstructor if they affect the message list, (c) teaching clients
/// to handle the corresponding notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    #[strum(serialize = "session.start")]
    #[serde(rename = "session.start")]
    SessionStart,
    #[strum(serialize = "session.end")]
    #[serde(rename = "session.end")]
    SessionEnd,
    #[strum(serialize = "session.fork")]
    #[serde(rename = "session.fork")]
    SessionFork,
    #[strum(serialize = "session.archived")]
    #[serde(rename = "session.archived")]
    SessionArchived,
    #[strum(serialize = "session.deleted")]
    #[serde(rename = "session.deleted")]
    SessionDeleted,

    #[strum(serialize = "message.user")]
    #[serde(rename = "message.user")]
    MessageUser,
    #[strum(serialize = "message.assistant")]
    #[serde(rename = "message.assistant")]
    MessageAssistant,
    #[strum(serialize = "message.system")]
    #[serde(rename = "message.system")]
    MessageSystem,

    #[strum(serialize = "tool.call")]
    #[serde(rename = "tool.call")]
    ToolCall,
    #[strum(serialize = "tool.result")]
    #[serde(rename = "tool.result")]
    ToolResult,

    #[strum(serialize = "stream.turn_start")]
    #[serde(rename = "stream.turn_start")]
    StreamTurnStart,
    #[strum(serialize = "stream.turn_end")]
    #[serde(rename = "stream.turn_end")]
    StreamTurnEnd,
    #[strum(serialize = "stream.thinking_complete")]
    #[serde(rename = "stream.thinking_complete")]
    StreamThinkingComplete,

    #[strum(serialize = "config.model_switch")]
    #[serde(rename = "config.model_switch")]
    ConfigModelSwitch,
    #[strum(serialize = "config.reasoning_level")]
    #[serde(rename = "config.reasoning_level")]
    ConfigReasoningLevel,
    #[strum(serialize = "config.prompt_update")]
    #[serde(rename = "config.prompt_update")]
    ConfigPromptUpdate,

    #[strum(serialize = "context.cleared")]
    #[serde(rename = "context.cleared")]
    ContextCleared,
    #[strum(serialize = "compact.boundary")]
    #[serde(rename = "compact.boundary")]
    CompactBoundary,
    #[strum(serialize = "compact.summary")]
    #[serde(rename = "compact.summary")]
    CompactSummary,

    #[strum(serialize = "subagent.spawned")]
    #[serde(rename = "subagent.spawned")]
    SubagentSpawned,
    #[strum(serialize = "subagent.progress")]
    #[serde(rename = "subagent.progress")]
    SubagentProgress,
    #[strum(serialize = "subagent.completed")]
    #[serde(rename = "subagent.completed")]
    SubagentCompleted,
    #[strum(serialize = "subagent.failed")]
    #[serde(rename = "subagent.failed")]
    SubagentFailed,

    #[strum(serialize = "hook.fired")]
    #[serde(rename = "hook.fired")]
    HookFired,
    #[strum(serialize = "rules.loaded")]
    #[serde(rename = "rules.loaded")]
    RulesLoaded,
    #[strum(serialize = "turn.failed")]
    #[serde(rename = "turn.failed")]
    TurnFailed,
    #[strum(serialize = "error.agent")]
    #[serde(rename = "error.agent")]
    ErrorAgent,
    #[strum(serialize = "error.tool")]
    #[serde(rename = "error.tool")]
    ErrorTool,
    #[strum(serialize = "error.provider")]
    #[serde(rename = "error.provider")]
    ErrorProvider,
    #[strum(serialize = "notification.interrupted")]
    #[serde(rename = "notification.interrupted")]
    NotificationInterrupted,
    #[strum(serialize = "worktree.acquired")]
    #[serde(rename = "worktree.acquired")]
    WorktreeAcquired,
    #[strum(serialize = "worktree.released")]
    #[serde(rename = "worktree.released")]
    WorktreeReleased,
    #[strum(serialize = "worktree.commit")]
    #[serde(rename = "worktree.commit")]
    WorktreeCommit,
    #[strum(serialize = "worktree.merged")]
    #[serde(rename = "worktree.merged")]
    WorktreeMerged,
    #[strum(serialize = "todo.write")]
    #[serde(rename = "todo.write")]
    TodoWrite,
    #[strum(serialize = "plan.updated")]
    #[serde(rename = "plan.updated")]
    PlanUpdated,
}

pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::SessionStart,
    EventType::SessionEnd,
    EventType::SessionFork,
    EventType::SessionArchived,
    EventType::SessionDeleted,
    EventType::MessageUser,
    EventType::MessageAssistant,
    EventType::MessageSystem,
    EventType::ToolCall,
    EventType::ToolResult,
    EventType::StreamTurnStart,
    EventType::StreamTurnEnd,
    EventType::StreamThinkingComplete,
    EventType::ConfigModelSwitch,
    EventType::ConfigReasoningLevel,
    EventType::ConfigPromptUpdate,
    EventType::ContextCleared,
    EventType::CompactBoundary,
    EventType::CompactSummary,
    EventType::SubagentSpawned,
    EventType::SubagentProgress,
    EventType::SubagentCompleted,
    EventType::SubagentFailed,
    EventType::HookFired,
    EventType::RulesLoaded,
    EventType::TurnFailed,
    EventType::ErrorAgent,
    EventType::ErrorTool,
    EventType::ErrorProvider,
    EventType::NotificationInterrupted,
    EventType::WorktreeAcquired,
    EventType::WorktreeReleased,
    EventType::WorktreeCommit,
    EventType::WorktreeMerged,
    EventType::TodoWrite,
    EventType::PlanUpdated,
];

/// Marker substituted for payload content that exceeded the large-content
/// threshold and was moved into blob storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TruncatedRef {
    #[serde(rename = "_truncated")]
    pub truncated: bool,
    pub blob_id: String,
}

impl TruncatedRef {
    pub fn new(blob_id: impl Into<String>) -> Self {
        Self {
            truncated: true,
            blob_id: blob_id.into(),
        }
    }
}

/// Either the real payload or a pointer to where it was spilled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SessionEventPayload {
    Truncated(TruncatedRef),
    Value(serde_json::Value),
}

impl SessionEventPayload {
    pub fn is_truncated(&self) -> bool {
        matches!(self, SessionEventPayload::Truncated(_))
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            SessionEventPayload::Value(v) => Some(v),
            SessionEventPayload::Truncated(_) => None,
        }
    }
}

/// An immutable node in a session's history tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: String,
    pub parent_id: Option<Uuid>,
    pub sequence: i64,
    pub depth: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: SessionEventPayload,
    pub content_blob_id: Option<String>,
    pub role: Option<String>,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub turn: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cache_read_tokens: Option<i64>,
    pub cache_creation_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub checksum: Option<String>,
}

impl SessionEvent {
    /// True when this event type carries assistant/tool content that
    /// participates in message reconstruction.
    pub fn is_message_bearing(&self) -> bool {
        matches!(
            self.event_type,
            EventType::MessageUser
                | EventType::MessageAssistant
                | EventType::MessageSystem
                | EventType::ToolResult
                | EventType::CompactSummary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_serde() {
        let json = serde_json::to_string(&EventType::ToolResult).unwrap();
        assert_eq!(json, "\"tool.result\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::ToolResult);
    }

    #[test]
    fn all_event_types_lists_every_variant_once() {
        let mut seen = std::collections::HashSet::new();
        for ty in ALL_EVENT_TYPES {
            assert!(seen.insert(ty.as_ref()), "duplicate {:?}", ty);
        }
        assert_eq!(ALL_EVENT_TYPES.len(), 35);
    }
}
