//! Queue for interactive tool replies (spec §4.9, `agent.respond`). A tool
//! that needs a value only the client can supply registers a pending slot
//! keyed by its own tool call id and awaits the receiver; the RPC layer
//! delivers the client's answer by calling `respond` with the same id.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

#[derive(Default)]
pub struct PendingResponseQueue {
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
}

impl PendingResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending reply for `tool_call_id`. The caller awaits the
    /// returned receiver; it resolves once `respond` delivers a value, or
    /// errors if this queue is dropped first.
    pub fn register(&self, tool_call_id: &str) -> oneshot::Receiver<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool_call_id.to_string(), tx);
        rx
    }

    /// Delivers `value` to whoever registered `tool_call_id`. Returns
    /// `false` if nothing is waiting (already answered, timed out, or the
    /// id was never registered).
    pub fn respond(&self, tool_call_id: &str, value: serde_json::Value) -> bool {
        let sender = self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(tool_call_id);
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_registered_reply_is_delivered_to_its_receiver() {
        let queue = PendingResponseQueue::new();
        let rx = queue.register("t1");
        assert!(queue.respond("t1", serde_json::json!({"ok": true})));
        assert_eq!(rx.await.unwrap(), serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn responding_to_an_unknown_id_is_reported_as_undelivered() {
        let queue = PendingResponseQueue::new();
        assert!(!queue.respond("ghost", serde_json::json!(null)));
    }
}
