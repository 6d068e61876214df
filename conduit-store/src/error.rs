//! Error taxonomy for the event store (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("failed to decode payload for event {event_id}: {reason}")]
    DecodeFailed { event_id: String, reason: String },
    #[error("sequence conflict in session {session_id}")]
    SequenceConflict { session_id: String },
    #[error("parent event {parent_id} missing in session {session_id}")]
    ParentMissing {
        session_id: String,
        parent_id: String,
    },
    #[error("head regression attempted on session {session_id}")]
    HeadRegression { session_id: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
