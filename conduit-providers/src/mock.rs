//! An in-memory provider double. Required because concrete provider HTTP
//! clients are out of scope; the turn orchestrator's tests still need
//! something that streams deltas.

use async_trait::async_trait;
use conduit_protocol::message::{ContentBlock, TokenUsage};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::provider::{CompletionStream, Provider};
use crate::types::{CompletionRequest, ModelInfo, ProviderUsage, StopReason, StreamDelta};

/// A scripted response: the text to stream (broken into deltas of a few
/// characters each) and the stop reason/usage the `Done` delta carries.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub text: String,
    pub tool_use: Option<(String, String, serde_json::Value)>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl ScriptedTurn {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_use: None,
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
            },
        }
    }

    pub fn with_tool_use(mut self, id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.tool_use = Some((id.into(), name.into(), input));
        self.stop_reason = StopReason::ToolUse;
        self
    }
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    turns: std::sync::Mutex<std::collections::VecDeque<ScriptedTurn>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            turns: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn with_turn(self, turn: ScriptedTurn) -> Self {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).push_back(turn);
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "mock-model".to_string(),
            context_window: 200_000,
            max_output_tokens: 8192,
            supports_tools: true,
            supports_thinking: true,
        }])
    }

    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let turn = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text_only("mock response"));
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let provider_name = self.name.clone();
        let model = request.model.clone();

        tokio::spawn(async move {
            for chunk in chunk_text(&turn.text, 8) {
                if tx.send(Ok(StreamDelta::TextDelta(chunk))).await.is_err() {
                    return;
                }
            }

            let mut content = Vec::new();
            if !turn.text.is_empty() {
                content.push(ContentBlock::Text { text: turn.text.clone() });
            }
            if let Some((id, name, input)) = turn.tool_use.clone() {
                let _ = tx
                    .send(Ok(StreamDelta::ToolUseStart {
                        id: id.clone(),
                        name: name.clone(),
                    }))
                    .await;
                content.push(ContentBlock::ToolUse { id, name, input });
            }

            let _ = tx
                .send(Ok(StreamDelta::Done {
                    content,
                    stop_reason: turn.stop_reason,
                    usage: ProviderUsage {
                        provider: provider_name,
                        model,
                        usage: turn.usage,
                    },
                }))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.chars()
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".to_string(),
            system_prompt: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn streams_text_then_a_terminal_done_delta() {
        let provider = MockProvider::new("mock").with_turn(ScriptedTurn::text_only("hello world"));
        let mut stream = provider.stream_completion(request()).await.unwrap();

        let mut reassembled = String::new();
        let mut saw_done = false;
        while let Some(delta) = stream.next().await {
            match delta.unwrap() {
                StreamDelta::TextDelta(chunk) => reassembled.push_str(&chunk),
                StreamDelta::Done { stop_reason, .. } => {
                    assert_eq!(stop_reason, StopReason::EndTurn);
                    saw_done = true;
                }
                _ => {}
            }
        }

        assert_eq!(reassembled, "hello world");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn tool_use_turn_emits_tool_use_start_before_done() {
        let provider = MockProvider::new("mock").with_turn(
            ScriptedTurn::text_only("").with_tool_use("t1", "list_dir", serde_json::json!({"path": "."})),
        );
        let mut stream = provider.stream_completion(request()).await.unwrap();

        let mut events = Vec::new();
        while let Some(delta) = stream.next().await {
            events.push(delta.unwrap());
        }

        assert!(matches!(events.first(), Some(StreamDelta::ToolUseStart { id, .. }) if id == "t1"));
        assert!(matches!(events.last(), Some(StreamDelta::Done { stop_reason: StopReason::ToolUse, .. })));
    }
}
