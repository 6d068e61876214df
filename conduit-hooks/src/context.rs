//! The context a hook observes a tool call through.

use conduit_protocol::hooks::HookPhase;

#[derive(Debug, Clone)]
pub struct HookContext {
    pub phase: HookPhase,
    pub session_id: String,
    pub tool_name: String,
    pub tool_call_id: String,
    pub arguments: serde_json::Value,
    /// Populated only at `PostToolUse`.
    pub result: Option<serde_json::Value>,
}

impl HookContext {
    pub fn pre_tool_use(session_id: impl Into<String>, tool_name: impl Into<String>, tool_call_id: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            phase: HookPhase::PreToolUse,
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            arguments,
            result: None,
        }
    }

    pub fn post_tool_use(mut self, result: serde_json::Value) -> Self {
        self.phase = HookPhase::PostToolUse;
        self.result = Some(result);
        self
    }
}
