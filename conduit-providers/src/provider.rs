//! The `Provider` trait boundary (SPEC_FULL.md §9, Open Question 1).

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::Result;
use crate::types::{CompletionRequest, ModelInfo, StreamDelta};

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Stands in for a concrete LLM HTTP client. Implementations (OpenAI,
/// Anthropic, etc.) live in crates outside this one's scope; this crate only
/// carries the trait boundary and an in-memory double for tests.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Opens a streaming completion. The returned stream ends with exactly
    /// one `StreamDelta::Done`, or yields an `Err` if the provider fails
    /// before producing one.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
