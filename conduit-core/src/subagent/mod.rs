//! Subagent spawning, depth enforcement, and tool visibility (spec §4.6).

pub mod tool_filter;
pub mod tracker;

pub use tool_filter::{ToolAccess, ToolFilter, ALWAYS_BLOCKED_TOOLS};
pub use tracker::{SubagentConfig, SubagentHandle, SubagentResult, SubagentState, SubagentTracker};
