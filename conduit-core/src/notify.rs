//! Real-time notification fan-out. `EventContext::emit` calls through this
//! trait; the RPC Coordinator (outside this crate) is the only place that
//! owns bounded per-client queues and the text-delta coalescing policy
//! spec.md §5 describes — this crate only needs a publish point.

use dashmap::DashMap;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Notification {
    pub session_id: String,
    pub method: String,
    pub data: serde_json::Value,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, session_id: &str, method: &str, data: serde_json::Value);
}

/// One broadcast channel per session. A late subscriber simply misses
/// earlier notifications, matching the orchestrator's "deltas are best
/// effort, the event log is the source of truth" stance.
pub struct BroadcastNotifier {
    channels: DashMap<String, broadcast::Sender<Notification>>,
    capacity: usize,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, session_id: &str, method: &str, data: serde_json::Value) {
        let sender = self
            .channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        // No subscribers is the common case between turns; broadcast::send
        // failing just means nobody is listening right now.
        let _ = sender.send(Notification {
            session_id: session_id.to_string(),
            method: method.to_string(),
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_notifications_for_its_session() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe("sess_1");
        notifier.notify("sess_1", "agent.text_delta", serde_json::json!({"text": "hi"}));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.method, "agent.text_delta");
    }

    #[tokio::test]
    async fn notify_with_no_subscribers_does_not_panic() {
        let notifier = BroadcastNotifier::default();
        notifier.notify("sess_1", "agent.text_delta", serde_json::json!({}));
    }
}
