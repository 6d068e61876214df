//! Errors surfaced across the provider trait boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("stream error: {0}")]
    StreamError(String),
}
