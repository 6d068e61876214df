//! Owns the lifecycle of spawned child sessions (spec §4.6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use conduit_protocol::session::SpawnType;
use conduit_protocol::TokenUsage;
use conduit_store::Store;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::subagent::tool_filter::ToolFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentState {
    Spawning,
    Running,
    Paused,
    WaitingInput,
    Completed,
    Failed,
}

pub struct SubagentHandle {
    pub child_session_id: String,
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubagentResult {
    pub success: bool,
    pub output: String,
    pub summary: Option<String>,
    pub total_turns: i64,
    pub token_usage: TokenUsage,
    pub duration: Duration,
}

struct TrackedSubagent {
    parent_session_id: String,
    state: SubagentState,
    depth: u32,
    cancellation: CancellationToken,
    started_at: Instant,
    result: Option<SubagentResult>,
    done: Arc<Notify>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubagentConfig {
    pub max_depth: u32,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self { max_depth: 4 }
    }
}

/// Keyed by child session id, mirroring the teacher's `DashMap`-backed
/// session-scoped store registry.
pub struct SubagentTracker {
    store: Arc<Store>,
    config: SubagentConfig,
    children: DashMap<String, TrackedSubagent>,
}

impl SubagentTracker {
    pub fn new(store: Arc<Store>, config: SubagentConfig) -> Self {
        Self {
            store,
            config,
            children: DashMap::new(),
        }
    }

    pub async fn spawn(
        &self,
        parent_session_id: &str,
        parent_depth: u32,
        task: &str,
        model: &str,
        spawn_type: SpawnType,
    ) -> Result<SubagentHandle> {
        let child_depth = parent_depth + 1;
        if child_depth > self.config.max_depth {
            return Err(EngineError::MaxDepthExceeded {
                max_depth: self.config.max_depth,
            });
        }

        let parent = self.store.sessions.get(parent_session_id).await?;
        let child = self
            .store
            .sessions
            .create(&parent.workspace_id, &parent.working_directory, model, None, &[])
            .await?;
        self.store
            .sessions
            .set_spawn_metadata(&child.id, parent_session_id, spawn_type, task)
            .await?;

        self.children.insert(
            child.id.clone(),
            TrackedSubagent {
                parent_session_id: parent_session_id.to_string(),
                state: SubagentState::Spawning,
                depth: child_depth,
                cancellation: CancellationToken::new(),
                started_at: Instant::now(),
                result: None,
                done: Arc::new(Notify::new()),
            },
        );

        self.store
            .events
            .append(
                parent_session_id,
                conduit_protocol::EventType::SubagentSpawned,
                serde_json::json!({
                    "childSessionId": child.id,
                    "task": task,
                    "model": model,
                    "depth": child_depth,
                }),
            )
            .await?;

        Ok(SubagentHandle {
            child_session_id: child.id,
            tool_call_id: None,
        })
    }

    pub fn depth_of(&self, child_session_id: &str) -> Option<u32> {
        self.children.get(child_session_id).map(|c| c.depth)
    }

    /// Marks the child running and mirrors a `subagent.progress` event onto
    /// the parent's own event stream (spec §4.6/§3.3).
    pub async fn mark_running(&self, child_session_id: &str) -> Result<()> {
        let parent_session_id = {
            let Some(mut entry) = self.children.get_mut(child_session_id) else {
                return Ok(());
            };
            entry.state = SubagentState::Running;
            entry.parent_session_id.clone()
        };
        self.store
            .events
            .append(
                &parent_session_id,
                conduit_protocol::EventType::SubagentProgress,
                serde_json::json!({"childSessionId": child_session_id, "state": "running"}),
            )
            .await?;
        Ok(())
    }

    /// Records the child's terminal outcome and mirrors `subagent.completed`
    /// or `subagent.failed` onto the parent's event stream.
    pub async fn complete(&self, child_session_id: &str, result: SubagentResult) -> Result<()> {
        let (parent_session_id, event_type) = {
            let Some(mut entry) = self.children.get_mut(child_session_id) else {
                return Ok(());
            };
            entry.state = if result.success {
                SubagentState::Completed
            } else {
                SubagentState::Failed
            };
            let event_type = if result.success {
                conduit_protocol::EventType::SubagentCompleted
            } else {
                conduit_protocol::EventType::SubagentFailed
            };
            entry.result = Some(result.clone());
            entry.done.notify_waiters();
            (entry.parent_session_id.clone(), event_type)
        };
        self.store
            .events
            .append(
                &parent_session_id,
                event_type,
                serde_json::json!({
                    "childSessionId": child_session_id,
                    "success": result.success,
                    "output": result.output,
                    "summary": result.summary,
                    "totalTurns": result.total_turns,
                }),
            )
            .await?;
        Ok(())
    }

    pub fn state(&self, child_session_id: &str) -> Option<SubagentState> {
        self.children.get(child_session_id).map(|c| c.state)
    }

    /// Blocks until the child reaches a terminal state.
    pub async fn await_child(&self, child_session_id: &str) -> Result<SubagentResult> {
        loop {
            let done = {
                let entry = self
                    .children
                    .get(child_session_id)
                    .ok_or_else(|| EngineError::SessionNotFound(child_session_id.to_string()))?;
                if let Some(result) = &entry.result {
                    return Ok(result.clone());
                }
                entry.done.clone()
            };
            done.notified().await;
        }
    }

    pub fn cancel(&self, child_session_id: &str) {
        if let Some(entry) = self.children.get(child_session_id) {
            entry.cancellation.cancel();
        }
    }

    /// Cancels every child spawned under `parent_session_id`'s cancellation,
    /// since a child cannot outlive its parent's archive (spec §4.6).
    pub fn cancel_all(&self) {
        for entry in self.children.iter() {
            entry.cancellation.cancel();
        }
    }

    pub fn default_tool_filter(&self) -> ToolFilter {
        ToolFilter::inherit_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_store::ConnectionConfig;

    async fn tracker() -> (SubagentTracker, String) {
        let store = Arc::new(Store::open_in_memory(&ConnectionConfig::default()).await.unwrap());
        let ws = store.workspaces.get_or_create("/tmp/ws", "ws").await.unwrap();
        let parent = store
            .sessions
            .create(&ws.id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        (SubagentTracker::new(store, SubagentConfig { max_depth: 2 }), parent.id)
    }

    #[tokio::test]
    async fn spawn_creates_a_child_session_with_spawn_metadata() {
        let (tracker, parent_id) = tracker().await;
        let handle = tracker
            .spawn(&parent_id, 0, "summarize", "claude-test", SpawnType::Subsession)
            .await
            .unwrap();
        assert_eq!(tracker.depth_of(&handle.child_session_id), Some(1));
    }

    #[tokio::test]
    async fn exceeding_max_depth_is_rejected_before_creating_a_session() {
        let (tracker, parent_id) = tracker().await;
        let first = tracker
            .spawn(&parent_id, 1, "task", "claude-test", SpawnType::Subsession)
            .await
            .unwrap();
        let result = tracker
            .spawn(&first.child_session_id, 2, "nested", "claude-test", SpawnType::Subsession)
            .await;
        assert!(matches!(result, Err(EngineError::MaxDepthExceeded { max_depth: 2 })));
    }

    #[tokio::test]
    async fn await_child_returns_once_complete_is_called() {
        let (tracker, parent_id) = tracker().await;
        let handle = tracker
            .spawn(&parent_id, 0, "task", "claude-test", SpawnType::Subsession)
            .await
            .unwrap();

        let child_id = handle.child_session_id.clone();
        tracker
            .complete(
                &child_id,
                SubagentResult {
                    success: true,
                    output: "done".to_string(),
                    summary: None,
                    total_turns: 1,
                    token_usage: TokenUsage::default(),
                    duration: Duration::from_secs(1),
                },
            )
            .await
            .unwrap();

        let result = tracker.await_child(&child_id).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn completing_a_subagent_mirrors_an_event_onto_the_parent_stream() {
        let (tracker, parent_id) = tracker().await;
        let handle = tracker
            .spawn(&parent_id, 0, "task", "claude-test", SpawnType::Subsession)
            .await
            .unwrap();

        tracker.mark_running(&handle.child_session_id).await.unwrap();
        tracker
            .complete(
                &handle.child_session_id,
                SubagentResult {
                    success: false,
                    output: "blew up".to_string(),
                    summary: None,
                    total_turns: 1,
                    token_usage: TokenUsage::default(),
                    duration: Duration::from_secs(1),
                },
            )
            .await
            .unwrap();

        let events = tracker.store.events.list(&parent_id, None, None).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == conduit_protocol::EventType::SubagentSpawned));
        assert!(events.iter().any(|e| e.event_type == conduit_protocol::EventType::SubagentProgress));
        assert!(events.iter().any(|e| e.event_type == conduit_protocol::EventType::SubagentFailed));
    }
}
