//! A bounded per-client notification queue (spec.md §5). Under normal load
//! items just queue up; once full, a new notification is coalesced into an
//! existing one (text deltas concatenate, tool-start/end kept unique)
//! instead of being dropped outright.

use std::collections::VecDeque;

use crate::protocol::RpcNotification;

pub struct ClientNotificationQueue {
    capacity: usize,
    items: VecDeque<RpcNotification>,
}

impl ClientNotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, notification: RpcNotification) {
        if self.items.len() < self.capacity {
            self.items.push_back(notification);
            return;
        }
        if self.try_coalesce(&notification) {
            return;
        }
        // Nothing to merge into: evict the oldest entry rather than drop
        // the incoming one, so state-changing notifications always land.
        self.items.pop_front();
        self.items.push_back(notification);
    }

    fn try_coalesce(&mut self, incoming: &RpcNotification) -> bool {
        match incoming.method.as_str() {
            "agent.text_delta" => self.coalesce_text_delta(incoming),
            "agent.tool_start" | "agent.tool_end" => self.dedup_by_id(incoming),
            _ => false,
        }
    }

    fn coalesce_text_delta(&mut self, incoming: &RpcNotification) -> bool {
        let Some(incoming_text) = incoming.params.get("text").and_then(|v| v.as_str()) else {
            return false;
        };
        let session_id = incoming.params.get("sessionId").and_then(|v| v.as_str());
        let Some(existing) = self.items.iter_mut().rev().find(|n| {
            n.method == "agent.text_delta" && n.params.get("sessionId").and_then(|v| v.as_str()) == session_id
        }) else {
            return false;
        };
        let merged = format!(
            "{}{incoming_text}",
            existing.params.get("text").and_then(|v| v.as_str()).unwrap_or("")
        );
        if let Some(obj) = existing.params.as_object_mut() {
            obj.insert("text".to_string(), merged.into());
        }
        true
    }

    fn dedup_by_id(&mut self, incoming: &RpcNotification) -> bool {
        let Some(id) = incoming.params.get("id").and_then(|v| v.as_str()) else {
            return false;
        };
        self.items
            .iter()
            .any(|n| n.method == incoming.method && n.params.get("id").and_then(|v| v.as_str()) == Some(id))
    }

    pub fn drain(&mut self) -> Vec<RpcNotification> {
        self.items.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
