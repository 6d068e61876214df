//! Fold a session's event chain into the message list a provider expects
//! (spec §4.3). The fold itself (`reconstruct_from_events`) is pure over the
//! event slice; `rehydrate_truncated_payloads` is the I/O step that runs
//! before it, resolving any payload `maybe_spill` moved to blob storage.

use conduit_protocol::event::SessionEventPayload;
use conduit_protocol::message::{ContentBlock, ToolResultContent, COMPACTION_ACK_TEXT, COMPACTION_SUMMARY_PREFIX};
use conduit_protocol::{EventType, Message, MessageRole, SessionEvent, TokenUsage};

use crate::blobs::BlobStore;

#[derive(Debug, Default)]
pub struct ReconstructionResult {
    pub messages: Vec<Message>,
    pub token_usage: TokenUsage,
    pub warnings: Vec<String>,
}

/// Folds `events` (already ordered by `sequence ASC`) into provider-facing
/// messages.
///
/// Skips everything before the last `compact.boundary`, synthesizes a
/// user/assistant acknowledgement pair for `compact.summary`, and pairs
/// `tool.result` content by tool-call id. Malformed payloads are recorded
/// as warnings rather than aborting reconstruction (spec §4.1/§7).
pub fn reconstruct_from_events(events: &[SessionEvent]) -> ReconstructionResult {
    let mut result = ReconstructionResult::default();

    let start_idx = events
        .iter()
        .rposition(|e| e.event_type == EventType::CompactBoundary)
        .map(|i| i + 1)
        .unwrap_or(0);

    for event in &events[start_idx..] {
        if let (Some(i), Some(o)) = (event.input_tokens, event.output_tokens) {
            result.token_usage.input_tokens += i;
            result.token_usage.output_tokens += o;
            result.token_usage.cache_read_tokens += event.cache_read_tokens.unwrap_or(0);
            result.token_usage.cache_creation_tokens += event.cache_creation_tokens.unwrap_or(0);
        }

        match event.event_type {
            EventType::MessageUser | EventType::MessageAssistant | EventType::MessageSystem => {
                match payload_to_message(event) {
                    Ok(msg) => result.messages.push(msg),
                    Err(reason) => result.warnings.push(format!(
                        "event {} ({}): {reason}",
                        event.id,
                        event.event_type.as_ref()
                    )),
                }
            }
            EventType::ToolResult => match tool_result_message(event) {
                Ok(msg) => result.messages.push(msg),
                Err(reason) => result.warnings.push(format!(
                    "event {} (tool.result): {reason}",
                    event.id
                )),
            },
            EventType::CompactSummary => {
                if let Some(summary) = event
                    .payload
                    .as_value()
                    .and_then(|v| v.get("summary"))
                    .and_then(|s| s.as_str())
                {
                    result.messages.push(Message {
                        role: MessageRole::User,
                        content: vec![ContentBlock::Text {
                            text: format!("{COMPACTION_SUMMARY_PREFIX}\n\n{summary}"),
                        }],
                    });
                    result.messages.push(Message {
                        role: MessageRole::Assistant,
                        content: vec![ContentBlock::Text {
                            text: COMPACTION_ACK_TEXT.to_string(),
                        }],
                    });
                } else {
                    result
                        .warnings
                        .push(format!("event {}: compact.summary missing summary field", event.id));
                }
            }
            _ => {}
        }
    }

    result
}

/// Resolves every truncated payload in `events` back to its full value
/// (spec §4.3 step 1, §6.4, S5) before folding. Tries the blob the payload
/// was spilled to first; if that blob is missing, falls back to whatever a
/// paired `tool.call` event already carries un-truncated (its `arguments`
/// for a `tool.call`/`tool.result` pair, or the tool-use blocks it implies
/// for a truncated `message.assistant`).
pub async fn rehydrate_truncated_payloads(mut events: Vec<SessionEvent>, blobs: &BlobStore) -> Vec<SessionEvent> {
    let tool_calls_by_id: std::collections::HashMap<String, SessionEvent> = events
        .iter()
        .filter(|e| e.event_type == EventType::ToolCall)
        .filter_map(|e| {
            let id = e
                .tool_call_id
                .clone()
                .or_else(|| e.payload.as_value()?.get("tool_call_id").and_then(|v| v.as_str()).map(String::from))?;
            Some((id, e.clone()))
        })
        .collect();

    let preceding_tool_calls: Vec<Vec<SessionEvent>> = (0..events.len())
        .map(|idx| {
            let mut calls = Vec::new();
            let mut i = idx;
            while i > 0 {
                i -= 1;
                match events[i].event_type {
                    EventType::ToolCall => calls.push(events[i].clone()),
                    EventType::ToolResult => continue,
                    _ => break,
                }
            }
            calls.reverse();
            calls
        })
        .collect();

    for (idx, event) in events.iter_mut().enumerate() {
        let SessionEventPayload::Truncated(truncated) = &event.payload else {
            continue;
        };

        if let Ok(Some(bytes)) = blobs.get(&truncated.blob_id).await {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                event.payload = SessionEventPayload::Value(value);
                continue;
            }
        }

        match event.event_type {
            EventType::ToolCall | EventType::ToolResult => {
                if let Some(tool_call_id) = &event.tool_call_id {
                    if let Some(call) = tool_calls_by_id.get(tool_call_id) {
                        if let Some(arguments) = call.payload.as_value().and_then(|v| v.get("arguments")) {
                            event.payload = SessionEventPayload::Value(serde_json::json!({
                                "tool_call_id": tool_call_id,
                                "content": arguments,
                                "is_error": false,
                            }));
                        }
                    }
                }
            }
            EventType::MessageAssistant => {
                let blocks: Vec<ContentBlock> = preceding_tool_calls[idx]
                    .iter()
                    .filter_map(|call| {
                        let value = call.payload.as_value()?;
                        let id = call
                            .tool_call_id
                            .clone()
                            .or_else(|| value.get("tool_call_id").and_then(|v| v.as_str()).map(String::from))?;
                        let name = value.get("name").and_then(|v| v.as_str())?.to_string();
                        let input = value.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
                        Some(ContentBlock::ToolUse { id, name, input })
                    })
                    .collect();
                if !blocks.is_empty() {
                    if let Ok(content) = serde_json::to_value(&blocks) {
                        event.payload = SessionEventPayload::Value(serde_json::json!({
                            "role": "assistant",
                            "content": content,
                        }));
                    }
                }
            }
            _ => {}
        }
    }

    events
}

fn payload_to_message(event: &SessionEvent) -> Result<Message, String> {
    let value = event.payload.as_value().ok_or("payload was truncated")?;
    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

fn tool_result_message(event: &SessionEvent) -> Result<Message, String> {
    let value = event.payload.as_value().ok_or("payload was truncated")?;
    let tool_use_id = event
        .tool_call_id
        .clone()
        .or_else(|| value.get("tool_call_id").and_then(|v| v.as_str()).map(String::from))
        .ok_or("missing tool_call_id")?;
    let is_error = value
        .get("is_error")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let content = match value.get("content") {
        Some(serde_json::Value::String(s)) => ToolResultContent::Text(s.clone()),
        Some(blocks @ serde_json::Value::Array(_)) => {
            serde_json::from_value(blocks.clone()).map_err(|e| e.to_string())?
        }
        _ => ToolResultContent::Text(String::new()),
    };
    Ok(Message {
        role: MessageRole::User,
        content: vec![ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conduit_protocol::event::SessionEventPayload;
    use serde_json::json;
    use uuid::Uuid;

    fn make_event(event_type: EventType, sequence: i64, payload: serde_json::Value) -> SessionEvent {
        SessionEvent {
            id: Uuid::now_v7(),
            session_id: "sess_test".to_string(),
            parent_id: None,
            sequence,
            depth: 0,
            event_type,
            timestamp: Utc::now(),
            payload: SessionEventPayload::Value(payload),
            content_blob_id: None,
            role: None,
            tool_name: None,
            tool_call_id: None,
            turn: None,
            input_tokens: None,
            output_tokens: None,
            cache_read_tokens: None,
            cache_creation_tokens: None,
            cost: None,
            checksum: None,
        }
    }

    fn user_text(sequence: i64, text: &str) -> SessionEvent {
        make_event(
            EventType::MessageUser,
            sequence,
            json!({"role": "user", "content": [{"type": "text", "text": text}]}),
        )
    }

    fn assistant_text(sequence: i64, text: &str) -> SessionEvent {
        make_event(
            EventType::MessageAssistant,
            sequence,
            json!({"role": "assistant", "content": [{"type": "text", "text": text}]}),
        )
    }

    #[test]
    fn reconstructs_simple_conversation_skipping_non_message_events() {
        let mut tool_call = make_event(EventType::ToolCall, 2, json!({"tool_name": "list_dir"}));
        tool_call.tool_call_id = Some("t1".to_string());
        let mut tool_result = make_event(
            EventType::ToolResult,
            3,
            json!({"content": "a.txt", "is_error": false}),
        );
        tool_result.tool_call_id = Some("t1".to_string());

        let events = vec![user_text(0, "hi"), assistant_text(1, "ok"), tool_call, tool_result];
        let result = reconstruct_from_events(&events);
        assert_eq!(result.messages.len(), 3);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn compact_boundary_skips_everything_before_it() {
        let boundary = make_event(EventType::CompactBoundary, 2, json!({"reason": "context_limit"}));
        let summary = make_event(
            EventType::CompactSummary,
            3,
            json!({"summary": "discussed X and Y"}),
        );
        let events = vec![
            user_text(0, "old message"),
            assistant_text(1, "old response"),
            boundary,
            summary,
            user_text(4, "new question"),
        ];
        let result = reconstruct_from_events(&events);
        // summary user+assistant pair + new question == 3
        assert_eq!(result.messages.len(), 3);
        match &result.messages[0].content[0] {
            ContentBlock::Text { text } => assert!(text.contains("discussed X and Y")),
            other => panic!("expected text block, got {other:?}"),
        }
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let events = vec![user_text(0, "hi"), assistant_text(1, "ok")];
        let a = reconstruct_from_events(&events);
        let b = reconstruct_from_events(&events);
        assert_eq!(a.messages, b.messages);
    }

    #[test]
    fn empty_session_reconstructs_to_no_messages() {
        let result = reconstruct_from_events(&[]);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn malformed_payload_becomes_a_warning_not_a_panic() {
        let bad = make_event(EventType::MessageUser, 0, json!({"not": "a message"}));
        let result = reconstruct_from_events(&[bad]);
        assert!(result.messages.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    async fn blob_store() -> BlobStore {
        let pool = crate::pool::new_in_memory(&crate::pool::ConnectionConfig::default()).await.unwrap();
        crate::migrations::run_migrations(&pool).await.unwrap();
        BlobStore::new(pool)
    }

    #[tokio::test]
    async fn rehydrates_a_truncated_payload_from_its_blob() {
        let blobs = blob_store().await;
        let full = json!({"role": "user", "content": [{"type": "text", "text": "a very long message"}]});
        let blob_id = blobs.store(full.to_string().as_bytes(), "application/json").await.unwrap();

        let mut truncated = user_text(0, "placeholder");
        truncated.payload = SessionEventPayload::Truncated(conduit_protocol::event::TruncatedRef {
            truncated: true,
            blob_id,
        });

        let events = rehydrate_truncated_payloads(vec![truncated], &blobs).await;
        let result = reconstruct_from_events(&events);
        assert_eq!(result.warnings.len(), 0);
        match &result.messages[0].content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "a very long message"),
            other => panic!("expected text block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_the_paired_tool_call_when_the_blob_is_gone() {
        let blobs = blob_store().await;

        let mut tool_call = make_event(EventType::ToolCall, 0, json!({"name": "list_dir", "arguments": {"path": "/tmp"}}));
        tool_call.tool_call_id = Some("t1".to_string());

        let mut tool_result = make_event(EventType::ToolResult, 1, json!({}));
        tool_result.tool_call_id = Some("t1".to_string());
        tool_result.payload = SessionEventPayload::Truncated(conduit_protocol::event::TruncatedRef {
            truncated: true,
            blob_id: "missing-blob".to_string(),
        });

        let events = rehydrate_truncated_payloads(vec![tool_call, tool_result], &blobs).await;
        let result = reconstruct_from_events(&events);
        assert!(result.warnings.is_empty());
        match &result.messages[0].content[0] {
            ContentBlock::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, "t1"),
            other => panic!("expected tool result block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconstructs_tool_use_blocks_for_a_truncated_assistant_message() {
        let blobs = blob_store().await;

        let mut tool_call = make_event(EventType::ToolCall, 0, json!({"name": "list_dir", "arguments": {"path": "/tmp"}}));
        tool_call.tool_call_id = Some("t1".to_string());

        let mut assistant = make_event(EventType::MessageAssistant, 1, json!({}));
        assistant.payload = SessionEventPayload::Truncated(conduit_protocol::event::TruncatedRef {
            truncated: true,
            blob_id: "missing-blob".to_string(),
        });

        let events = rehydrate_truncated_payloads(vec![tool_call, assistant], &blobs).await;
        let result = reconstruct_from_events(&events);
        assert!(result.warnings.is_empty());
        match &result.messages[0].content[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert_eq!(id, "t1");
                assert_eq!(name, "list_dir");
            }
            other => panic!("expected tool use block, got {other:?}"),
        }
    }
}
