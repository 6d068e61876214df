//! Append-only event log (spec §4.1). The hard invariant: every session
//! state is a deterministic fold over its event ancestry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conduit_protocol::blob::LARGE_CONTENT_THRESHOLD_BYTES;
use conduit_protocol::event::{SessionEventPayload, TruncatedRef};
use conduit_protocol::{EventType, SessionEvent};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::blobs::BlobStore;
use crate::error::{Result, StoreError};

/// Per-session mutex guaranteeing the parent chain and sequence counter are
/// only ever advanced by one writer at a time, mirroring the teacher's
/// `SessionLocks` map.
#[derive(Default)]
struct SessionLocks {
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    fn get(&mut self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct EventRepo {
    pool: SqlitePool,
    blobs: BlobStore,
    session_locks: Mutex<SessionLocks>,
}

impl EventRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            blobs: BlobStore::new(pool.clone()),
            pool,
            session_locks: Mutex::new(SessionLocks::default()),
        }
    }

    pub async fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<SessionEvent> {
        self.append_with_depth(session_id, event_type, payload, None, 0)
            .await
    }

    /// `depth` lets subagent-originated events mirrored onto the parent
    /// stream carry the child's depth + 1 (SPEC_FULL.md §3).
    pub async fn append_with_depth(
        &self,
        session_id: &str,
        event_type: EventType,
        payload: serde_json::Value,
        explicit_parent_id: Option<Uuid>,
        depth: i64,
    ) -> Result<SessionEvent> {
        let lock = self.session_locks.lock().await.get(session_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let existing_head: Option<String> =
            sqlx::query_scalar("SELECT head_event_id FROM sessions WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;

        if let (Some(explicit), Some(head)) = (explicit_parent_id, &existing_head) {
            if explicit.to_string() != *head && !self.is_ancestor(&mut tx, session_id, explicit).await? {
                return Err(StoreError::ParentMissing {
                    session_id: session_id.to_string(),
                    parent_id: explicit.to_string(),
                });
            }
        }
        let parent_id = explicit_parent_id.or_else(|| {
            existing_head
                .as_deref()
                .and_then(|s| s.parse::<Uuid>().ok())
        });

        let max_seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sequence), -1) FROM events WHERE session_id = ?1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        let sequence = max_seq + 1;

        let event_id = Uuid::now_v7();
        let now = Utc::now();

        let (stored_payload, content_blob_id) = self
            .maybe_spill(&mut tx, &payload)
            .await?;

        let role = payload.get("role").and_then(|v| v.as_str()).map(String::from);
        let tool_name = payload
            .get("tool_name")
            .or_else(|| payload.get("name"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let tool_call_id = payload
            .get("tool_call_id")
            .or_else(|| payload.get("id"))
            .and_then(|v| v.as_str())
            .map(String::from);

        sqlx::query(
            "INSERT INTO events (id, session_id, parent_id, sequence, depth, type, timestamp,
                payload, content_blob_id, role, tool_name, tool_call_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(event_id.to_string())
        .bind(session_id)
        .bind(parent_id.map(|p| p.to_string()))
        .bind(sequence)
        .bind(depth)
        .bind(event_type.as_ref())
        .bind(now.to_rfc3339())
        .bind(serde_json::to_string(&stored_payload)?)
        .bind(&content_blob_id)
        .bind(&role)
        .bind(&tool_name)
        .bind(&tool_call_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE sessions SET head_event_id = ?1, last_activity_at = ?2,
                event_count = event_count + 1 WHERE id = ?3",
        )
        .bind(event_id.to_string())
        .bind(now.to_rfc3339())
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        if existing_head.is_none() {
            sqlx::query("UPDATE sessions SET root_event_id = ?1 WHERE id = ?2")
                .bind(event_id.to_string())
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(text) = extract_searchable_text(&payload) {
            sqlx::query(
                "INSERT INTO events_fts (event_id, session_id, body) VALUES (?1, ?2, ?3)",
            )
            .bind(event_id.to_string())
            .bind(session_id)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SessionEvent {
            id: event_id,
            session_id: session_id.to_string(),
            parent_id,
            sequence,
            depth,
            event_type,
            timestamp: now,
            payload: stored_payload,
            content_blob_id,
            role,
            tool_name,
            tool_call_id,
            turn: None,
            input_tokens: None,
            output_tokens: None,
            cache_read_tokens: None,
            cache_creation_tokens: None,
            cost: None,
            checksum: None,
        })
    }

    async fn maybe_spill(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        payload: &serde_json::Value,
    ) -> Result<(SessionEventPayload, Option<String>)> {
        let raw = serde_json::to_vec(payload)?;
        if raw.len() <= LARGE_CONTENT_THRESHOLD_BYTES {
            return Ok((SessionEventPayload::Value(payload.clone()), None));
        }
        let blob_id = self
            .blobs
            .store_in_tx(tx, &raw, "application/json")
            .await?;
        Ok((
            SessionEventPayload::Truncated(TruncatedRef::new(blob_id.clone())),
            Some(blob_id),
        ))
    }

    async fn is_ancestor(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session_id: &str,
        candidate: Uuid,
    ) -> Result<bool> {
        let exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM events WHERE id = ?1 AND session_id = ?2")
                .bind(candidate.to_string())
                .bind(session_id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(exists.is_some())
    }

    pub async fn get(&self, event_id: Uuid) -> Result<SessionEvent> {
        let row = sqlx::query_as::<_, EventRow>(SELECT_EVENT)
            .bind(event_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
        row.try_into()
    }

    pub async fn list(
        &self,
        session_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<SessionEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "{SELECT_EVENT} WHERE session_id = ?1 ORDER BY sequence ASC LIMIT ?2 OFFSET ?3"
        ))
        .bind(session_id)
        .bind(limit.unwrap_or(10_000))
        .bind(offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Every blob a session's events spilled content into, for the ref-count
    /// cascade `Store::delete_session` runs (spec §4.1/§3.3).
    pub async fn content_blob_ids(&self, session_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT content_blob_id FROM events WHERE session_id = ?1 AND content_blob_id IS NOT NULL",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn list_after_sequence(
        &self,
        session_id: &str,
        after_sequence: i64,
        limit: i64,
    ) -> Result<Vec<SessionEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "{SELECT_EVENT} WHERE session_id = ?1 AND sequence > ?2 ORDER BY sequence ASC LIMIT ?3"
        ))
        .bind(session_id)
        .bind(after_sequence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn count_by_session(&self, session_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Yields events from `head_id` back to the session root.
    pub async fn walk_ancestors(&self, head_id: Uuid) -> Result<Vec<SessionEvent>> {
        let mut chain = Vec::new();
        let mut cursor = Some(head_id);
        while let Some(id) = cursor {
            let event = self.get(id).await?;
            cursor = event.parent_id;
            chain.push(event);
        }
        Ok(chain)
    }

    pub async fn search(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let rows: Vec<(String, String, f64)> = if let Some(sid) = session_id {
            sqlx::query_as(
                "SELECT event_id, snippet(events_fts, 2, '[', ']', '...', 8), rank
                 FROM events_fts WHERE events_fts MATCH ?1 AND session_id = ?2
                 ORDER BY rank LIMIT ?3",
            )
            .bind(query)
            .bind(sid)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT event_id, snippet(events_fts, 2, '[', ']', '...', 8), rank
                 FROM events_fts WHERE events_fts MATCH ?1
                 ORDER BY rank LIMIT ?2",
            )
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows
            .into_iter()
            .map(|(event_id, snippet, rank)| SearchResult {
                event_id,
                snippet,
                rank,
            })
            .collect())
    }

    pub async fn archive(&self, session_id: &str) -> Result<()> {
        // Events remain; archival is a session-level flag owned by the
        // session registry. Present here only so blob ref-counts can be
        // swept when a session is later deleted.
        let _ = session_id;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub event_id: String,
    pub snippet: String,
    pub rank: f64,
}

fn extract_searchable_text(payload: &serde_json::Value) -> Option<String> {
    let Some(content) = payload.get("content") else {
        return payload.get("text").and_then(|t| t.as_str()).map(String::from);
    };

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let blocks = content.as_array()?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

const SELECT_EVENT: &str = "SELECT id, session_id, parent_id, sequence, depth, type, timestamp,
    payload, content_blob_id, role, tool_name, tool_call_id, turn, input_tokens,
    output_tokens, cache_read_tokens, cache_creation_tokens, cost, checksum
    FROM events";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    session_id: String,
    parent_id: Option<String>,
    sequence: i64,
    depth: i64,
    #[sqlx(rename = "type")]
    event_type: String,
    timestamp: String,
    payload: String,
    content_blob_id: Option<String>,
    role: Option<String>,
    tool_name: Option<String>,
    tool_call_id: Option<String>,
    turn: Option<i64>,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_read_tokens: Option<i64>,
    cache_creation_tokens: Option<i64>,
    cost: Option<f64>,
    checksum: Option<String>,
}

impl TryFrom<EventRow> for SessionEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        use std::str::FromStr as _;
        let event_type = EventType::from_str(&row.event_type).map_err(|_| StoreError::DecodeFailed {
            event_id: row.id.clone(),
            reason: format!("unknown event type {}", row.event_type),
        })?;
        let payload: SessionEventPayload =
            serde_json::from_str(&row.payload).map_err(|e| StoreError::DecodeFailed {
                event_id: row.id.clone(),
                reason: e.to_string(),
            })?;
        let timestamp: DateTime<Utc> = row
            .timestamp
            .parse()
            .map_err(|_| StoreError::DecodeFailed {
                event_id: row.id.clone(),
                reason: "bad timestamp".to_string(),
            })?;
        Ok(SessionEvent {
            id: Uuid::from_str(&row.id).map_err(|_| StoreError::DecodeFailed {
                event_id: row.id.clone(),
                reason: "bad id".to_string(),
            })?,
            session_id: row.session_id,
            parent_id: row.parent_id.and_then(|s| Uuid::from_str(&s).ok()),
            sequence: row.sequence,
            depth: row.depth,
            event_type,
            timestamp,
            payload,
            content_blob_id: row.content_blob_id,
            role: row.role,
            tool_name: row.tool_name,
            tool_call_id: row.tool_call_id,
            turn: row.turn,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            cache_read_tokens: row.cache_read_tokens,
            cache_creation_tokens: row.cache_creation_tokens,
            cost: row.cost,
            checksum: row.checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::pool::{new_in_memory, ConnectionConfig};
    use crate::sessions::SessionRepo;
    use crate::workspaces::WorkspaceRepo;
    use serde_json::json;

    async fn setup() -> (EventRepo, String) {
        let pool = new_in_memory(&ConnectionConfig::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let ws = WorkspaceRepo::new(pool.clone())
            .get_or_create("/tmp/ws", "ws")
            .await
            .unwrap();
        let session = SessionRepo::new(pool.clone())
            .create(&ws.id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        (EventRepo::new(pool), session.id)
    }

    #[tokio::test]
    async fn append_builds_parent_chain() {
        let (repo, session_id) = setup().await;
        let e1 = repo
            .append(&session_id, EventType::MessageUser, json!({"content": "hi"}))
            .await
            .unwrap();
        let e2 = repo
            .append(
                &session_id,
                EventType::MessageAssistant,
                json!({"content": "hello"}),
            )
            .await
            .unwrap();

        assert!(e1.parent_id.is_none());
        assert_eq!(e2.parent_id, Some(e1.id));
        assert_eq!(e1.sequence, 0);
        assert_eq!(e2.sequence, 1);
    }

    #[tokio::test]
    async fn walk_ancestors_ends_at_root_with_decreasing_sequence() {
        let (repo, session_id) = setup().await;
        let mut last = None;
        for i in 0..4 {
            last = Some(
                repo.append(&session_id, EventType::MessageUser, json!({"n": i}))
                    .await
                    .unwrap(),
            );
        }
        let chain = repo.walk_ancestors(last.unwrap().id).await.unwrap();
        assert_eq!(chain.len(), 4);
        for pair in chain.windows(2) {
            assert!(pair[0].sequence > pair[1].sequence);
        }
        assert!(chain.last().unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn large_payload_is_spilled_to_a_blob() {
        let (repo, session_id) = setup().await;
        let big = "x".repeat(6 * 1024);
        let event = repo
            .append(&session_id, EventType::ToolResult, json!({"content": big}))
            .await
            .unwrap();
        assert!(event.payload.is_truncated());
        assert!(event.content_blob_id.is_some());
    }

    #[tokio::test]
    async fn list_after_sequence_returns_only_newer_events() {
        let (repo, session_id) = setup().await;
        for i in 0..5 {
            repo.append(&session_id, EventType::MessageUser, json!({"n": i}))
                .await
                .unwrap();
        }
        let after = repo.list_after_sequence(&session_id, 2, 100).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].sequence, 3);
    }

    #[tokio::test]
    async fn message_payloads_with_content_blocks_are_searchable() {
        let (repo, session_id) = setup().await;
        repo.append(
            &session_id,
            EventType::MessageUser,
            json!({"role": "user", "content": [{"type": "text", "text": "find the needle in here"}]}),
        )
        .await
        .unwrap();

        let results = repo.search("needle", Some(&session_id), 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn extract_searchable_text_concatenates_multiple_text_blocks() {
        let payload = json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "t1", "name": "echo", "input": {}},
                {"type": "text", "text": "second"},
            ],
        });
        assert_eq!(extract_searchable_text(&payload), Some("first\nsecond".to_string()));
    }
}
