//! The engine: session lifecycle, the Turn Orchestrator state machine, tool
//! dispatch, context compaction, and subagent tracking (spec §4).
//!
//! This crate has no network surface of its own; `conduit-rpc` is the only
//! caller and owns the one process-global it needs (its subscriber
//! registry). Everything here is constructed per-process and handed in.

pub mod context;
pub mod error;
pub mod event_context;
pub mod interactive;
pub mod notify;
pub mod orchestrator;
pub mod session_registry;
pub mod subagent;
pub mod tool;
pub mod tool_executor;

pub use context::{CompactionOutcome, ContextManager, Summary};
pub use error::{EngineError, Result};
pub use event_context::EventContext;
pub use interactive::PendingResponseQueue;
pub use notify::{BroadcastNotifier, Notification, Notifier};
pub use orchestrator::{ContextSnapshot, TurnOrchestrator, TurnOrchestratorConfig, TurnState, TurnSummary};
pub use session_registry::SessionRegistry;
pub use subagent::{SubagentConfig, SubagentTracker, ToolAccess, ToolFilter};
pub use tool::{EchoTool, ExecutionMode, Tool, ToolError, ToolOutcome, ToolSchema};
pub use tool_executor::{ToolExecutor, ToolResult};
