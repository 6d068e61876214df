//! The `Provider` trait boundary standing in for concrete LLM HTTP clients
//! (SPEC_FULL.md §2).

pub mod cost;
pub mod error;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod types;

pub use cost::CostTable;
pub use error::{ProviderError, Result};
pub use mock::{MockProvider, ScriptedTurn};
pub use provider::{CompletionStream, Provider};
pub use registry::ProviderRegistry;
pub use types::{CompletionRequest, ModelInfo, ProviderUsage, StopReason, StreamDelta, ToolSpec};
