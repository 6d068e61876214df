//! The one process-global piece of mutable state this workspace allows
//! (SPEC_FULL.md §9): a registry of which connected clients are watching
//! which session. It exists to fan a single `conduit_core::Notifier::notify`
//! call out to every client subscribed to that session, each through its own
//! bounded, coalescing queue.

use std::sync::Arc;
use std::sync::Mutex;

use conduit_core::Notifier;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::protocol::RpcNotification;
use crate::queue::ClientNotificationQueue;

pub type ClientId = Uuid;

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A connected client's inbox for one session's notifications.
pub struct ClientChannel {
    queue: Mutex<ClientNotificationQueue>,
    wake: Notify,
}

impl ClientChannel {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(ClientNotificationQueue::new(capacity)),
            wake: Notify::new(),
        }
    }

    fn push(&self, notification: RpcNotification) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push(notification);
        self.wake.notify_one();
    }

    /// Waits for at least one notification, then returns every notification
    /// currently queued. Coalesces in the caller's stead: whatever the
    /// queue merged while this task was busy writing a previous batch is
    /// already folded together by the time it lands here.
    pub async fn recv_batch(&self) -> Vec<RpcNotification> {
        loop {
            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if !queue.is_empty() {
                    return queue.drain();
                }
            }
            self.wake.notified().await;
        }
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    sessions: DashMap<String, DashMap<ClientId, Arc<ClientChannel>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: &str, client_id: ClientId) -> Arc<ClientChannel> {
        self.subscribe_with_capacity(session_id, client_id, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, session_id: &str, client_id: ClientId, capacity: usize) -> Arc<ClientChannel> {
        let channel = Arc::new(ClientChannel::new(capacity));
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(client_id, channel.clone());
        channel
    }

    pub fn unsubscribe(&self, session_id: &str, client_id: ClientId) {
        if let Some(clients) = self.sessions.get(session_id) {
            clients.remove(&client_id);
        }
    }

    /// Drops every subscription held by a client, across all sessions.
    /// Called once when a connection closes.
    pub fn unsubscribe_all(&self, client_id: ClientId) {
        for entry in self.sessions.iter() {
            entry.value().remove(&client_id);
        }
    }

    pub fn publish(&self, session_id: &str, notification: RpcNotification) {
        let Some(clients) = self.sessions.get(session_id) else {
            return;
        };
        for entry in clients.iter() {
            entry.value().push(notification.clone());
        }
    }
}

/// Bridges `conduit_core`'s wire-agnostic notifier trait into the
/// JSON-RPC notification fan-out this crate owns.
pub struct RpcNotifier {
    registry: Arc<SubscriberRegistry>,
}

impl RpcNotifier {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }
}

impl Notifier for RpcNotifier {
    fn notify(&self, session_id: &str, method: &str, data: Value) {
        self.registry.publish(session_id, RpcNotification::new(method, data));
    }
}
