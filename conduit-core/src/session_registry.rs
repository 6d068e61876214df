//! Thin facade over `conduit-store`'s repositories exposing spec.md §4.2's
//! contract as one type the RPC Coordinator can hold.

use std::sync::Arc;

use conduit_protocol::{Session, SessionEvent, SessionSummary};
use conduit_store::sessions::{CounterDelta, ListSessionsFilter};
use conduit_store::Store;
use uuid::Uuid;

use crate::error::{EngineError, Result};

pub struct SessionRegistry {
    pub(crate) store: Arc<Store>,
}

impl SessionRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        workspace_path: &str,
        workspace_name: &str,
        model: &str,
        title: Option<&str>,
        tags: &[String],
    ) -> Result<Session> {
        let workspace = self.store.workspaces.get_or_create(workspace_path, workspace_name).await?;
        let session = self
            .store
            .sessions
            .create(&workspace.id, workspace_path, model, title, tags)
            .await?;
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.store.sessions.get(session_id).await.map_err(EngineError::from)
    }

    pub async fn list(&self, filter: &ListSessionsFilter) -> Result<Vec<Session>> {
        Ok(self.store.sessions.list(filter).await?)
    }

    /// Lightweight projection for `session.list`, avoiding a full
    /// reconstruction pass per session.
    pub async fn list_summaries(&self, filter: &ListSessionsFilter) -> Result<Vec<SessionSummary>> {
        let sessions = self.list(filter).await?;
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let preview = self.message_preview(&session.id).await.unwrap_or(None);
            summaries.push(SessionSummary {
                id: session.id,
                title: session.title,
                model_id: session.model_id,
                last_activity_at: session.last_activity_at,
                message_preview: preview,
                turn_count: session.counters.turn_count,
            });
        }
        Ok(summaries)
    }

    async fn message_preview(&self, session_id: &str) -> Result<Option<String>> {
        let events = self.store.events.list(session_id, Some(50), None).await?;
        let events = conduit_store::rehydrate_truncated_payloads(events, &self.store.blobs).await;
        let reconstructed = conduit_store::reconstruct_from_events(&events);
        Ok(reconstructed
            .messages
            .iter()
            .rev()
            .find_map(|m| m.content.iter().find_map(|block| match block {
                conduit_protocol::message::ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })))
    }

    pub async fn advance_head(&self, session_id: &str, event_id: Uuid) -> Result<()> {
        Ok(self.store.sessions.advance_head(session_id, event_id).await?)
    }

    pub async fn increment_counters(&self, session_id: &str, delta: CounterDelta) -> Result<()> {
        Ok(self.store.sessions.increment_counters(session_id, delta).await?)
    }

    /// Backs `events.list` (spec.md §4.7): the raw event page, unreconstructed.
    pub async fn list_events(&self, session_id: &str, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<SessionEvent>> {
        Ok(self.store.events.list(session_id, limit, offset).await?)
    }

    /// Backs `events.sync`: only events appended after a client's last-seen
    /// sequence number, for incremental catch-up.
    pub async fn list_events_after(&self, session_id: &str, after_sequence: i64, limit: i64) -> Result<Vec<SessionEvent>> {
        Ok(self.store.events.list_after_sequence(session_id, after_sequence, limit).await?)
    }

    pub async fn switch_model(&self, session_id: &str, model: &str) -> Result<Session> {
        self.store.sessions.update_model(session_id, model).await?;
        self.get(session_id).await
    }

    pub async fn archive(&self, session_id: &str) -> Result<()> {
        Ok(self.store.sessions.archive(session_id).await?)
    }

    pub async fn unarchive(&self, session_id: &str) -> Result<()> {
        Ok(self.store.sessions.unarchive(session_id).await?)
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        Ok(self.store.delete_session(session_id).await?)
    }

    /// Creates a new session whose root re-parents the subtree at
    /// `from_event_id`; message reconstruction up to that point is
    /// identical in both sessions.
    pub async fn fork(&self, session_id: &str, from_event_id: Option<Uuid>) -> Result<Session> {
        let parent = self.get(session_id).await?;
        let fork_point = from_event_id.or(parent.head_event_id);
        let Some(fork_point) = fork_point else {
            return Err(EngineError::SessionNotFound(format!("{session_id} has no events to fork")));
        };

        let child = self
            .store
            .sessions
            .create(&parent.workspace_id, &parent.working_directory, &parent.model_id, parent.title.as_deref(), &parent.tags)
            .await?;
        self.store.sessions.set_fork_pointer(&child.id, session_id, fork_point).await?;
        self.store.sessions.set_root_if_absent(&child.id, fork_point).await?;
        self.store.sessions.advance_head(&child.id, fork_point).await?;

        self.store
            .events
            .append(
                session_id,
                conduit_protocol::EventType::SessionFork,
                serde_json::json!({"childSessionId": child.id, "forkPointEventId": fork_point}),
            )
            .await?;
        self.store
            .events
            .append(
                &child.id,
                conduit_protocol::EventType::SessionFork,
                serde_json::json!({"parentSessionId": session_id, "forkPointEventId": fork_point}),
            )
            .await?;

        self.get(&child.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_store::ConnectionConfig;

    async fn registry() -> SessionRegistry {
        let store = Arc::new(Store::open_in_memory(&ConnectionConfig::default()).await.unwrap());
        SessionRegistry::new(store)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let registry = registry().await;
        let session = registry
            .create("/tmp/ws", "ws", "claude-test", Some("first"), &[])
            .await
            .unwrap();
        let fetched = registry.get(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn fork_reparents_at_the_requested_event() {
        let registry = registry().await;
        let session = registry.create("/tmp/ws", "ws", "claude-test", None, &[]).await.unwrap();
        let event = registry
            .store
            .events
            .append(&session.id, conduit_protocol::EventType::MessageUser, serde_json::json!({"content": "hi"}))
            .await
            .unwrap();

        let child = registry.fork(&session.id, Some(event.id)).await.unwrap();
        assert_eq!(child.parent_session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(child.fork_event_id, Some(event.id));
        assert_eq!(child.root_event_id, Some(event.id));
    }
}
