//! A scoped envelope created once per inbound dispatch (spec §4.8). Carries
//! the fields every handler would otherwise have to thread through by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use conduit_protocol::SessionEvent;
use conduit_store::Store;
use uuid::Uuid;

use crate::error::Result;
use crate::notify::Notifier;

/// One per inbound event dispatch (one `agent.message`, one subagent step).
/// `runId` ties every event/notification produced during the dispatch back
/// to the turn that produced them.
#[derive(Clone)]
pub struct EventContext {
    pub session_id: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    store: Arc<Store>,
    notifier: Arc<dyn Notifier>,
}

impl EventContext {
    pub fn new(session_id: impl Into<String>, store: Arc<Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: Uuid::now_v7(),
            created_at: Utc::now(),
            store,
            notifier,
        }
    }

    /// Broadcasts a notification to subscribers of this session, stamping
    /// `sessionId`/`timestamp`/`runId` automatically.
    pub fn emit(&self, method: &str, mut data: serde_json::Value) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("sessionId".to_string(), self.session_id.clone().into());
            obj.insert("runId".to_string(), self.run_id.to_string().into());
            obj.insert("timestamp".to_string(), self.created_at.to_rfc3339().into());
        }
        self.notifier.notify(&self.session_id, method, data);
    }

    /// Appends an event to the store, merging `runId` into the payload.
    pub async fn persist(
        &self,
        event_type: conduit_protocol::EventType,
        mut payload: serde_json::Value,
    ) -> Result<SessionEvent> {
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("runId".to_string(), self.run_id.to_string().into());
        }
        let event = self.store.events.append(&self.session_id, event_type, payload).await?;
        Ok(event)
    }
}
