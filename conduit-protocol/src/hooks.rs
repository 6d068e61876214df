//! Hook phase and decision wire types.
//!
//! Trimmed from the teacher's broader phase set to the two phases the
//! tool executor actually fires (§4.9): before dispatch, and after a result
//! is produced.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    PreToolUse,
    PostToolUse,
}

/// What a hook decided about a tool call it observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum HookDecision {
    Allow,
    Deny { reason: String },
}

impl HookDecision {
    pub fn is_deny(&self) -> bool {
        matches!(self, HookDecision::Deny { .. })
    }
}
