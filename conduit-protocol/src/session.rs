//! Workspace, session, and branch metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use uuid::Uuid;

/// Directory context a session lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub canonical_path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new_id() -> String {
        format!("ws_{}", Uuid::now_v7())
    }
}

/// How a session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SpawnType {
    Subsession,
    Tmux,
    Fork,
}

/// Denormalized token/turn counters carried on every session row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub event_count: i64,
    pub message_count: i64,
    pub turn_count: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub last_turn_input_tokens: i64,
    pub total_cost: f64,
}

/// A pointer into the event tree plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub workspace_id: String,
    pub head_event_id: Option<Uuid>,
    pub root_event_id: Option<Uuid>,
    pub title: Option<String>,
    pub model_id: String,
    pub working_directory: String,
    pub parent_session_id: Option<String>,
    pub fork_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub counters: SessionCounters,
    pub spawning_session_id: Option<String>,
    pub spawn_type: Option<SpawnType>,
    pub spawn_task: Option<String>,
    pub tags: Vec<String>,
}

impl Session {
    pub fn new_id() -> String {
        format!("sess_{}", Uuid::now_v7())
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Lightweight projection for session-picker style listings, avoiding a
/// full message reconstruction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub model_id: String,
    pub last_activity_at: DateTime<Utc>,
    pub message_preview: Option<String>,
    pub turn_count: i64,
}

/// A named pointer set within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub description: Option<String>,
    pub root_event_id: Uuid,
    pub head_event_id: Uuid,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
