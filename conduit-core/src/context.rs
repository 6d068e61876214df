//! Token estimation and compaction (spec §4.4).

use conduit_protocol::{Message, MessageRole};
use conduit_protocol::message::{ContentBlock, COMPACTION_ACK_TEXT, COMPACTION_SUMMARY_PREFIX};

pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.70;
pub const DEFAULT_PRESERVE_TURNS: usize = 3;

#[derive(Debug, Clone)]
pub struct Context {
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub compacted: bool,
    pub tokens_saved: i64,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub summary: String,
    pub key_decisions: Vec<String>,
    pub files_modified: Vec<String>,
}

/// chars/4 heuristic; providers supply exact counts post-turn.
pub fn estimate_tokens(messages: &[Message]) -> i64 {
    let chars: usize = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(content_block_chars)
        .sum();
    (chars / 4) as i64
}

fn content_block_chars(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text { text } | ContentBlock::Thinking { text } => text.len(),
        ContentBlock::ToolUse { input, .. } => input.to_string().len(),
        ContentBlock::ToolResult { content, .. } => match content {
            conduit_protocol::message::ToolResultContent::Text(t) => t.len(),
            conduit_protocol::message::ToolResultContent::Blocks(blocks) => {
                blocks.iter().map(content_block_chars).sum()
            }
        },
    }
}

pub struct ContextManager {
    threshold: f64,
    preserve_turns: usize,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COMPACTION_THRESHOLD,
            preserve_turns: DEFAULT_PRESERVE_TURNS,
        }
    }
}

impl ContextManager {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_preserve_turns(mut self, turns: usize) -> Self {
        self.preserve_turns = turns;
        self
    }

    pub fn get_limit(&self, model_id: &str) -> i64 {
        model_context_limit(model_id)
    }

    pub fn estimate(&self, messages: &[Message]) -> i64 {
        estimate_tokens(messages)
    }

    pub fn should_compact(&self, messages: &[Message], model_id: &str) -> bool {
        let limit = self.get_limit(model_id);
        self.estimate(messages) as f64 > self.threshold * limit as f64
    }

    /// Splits `messages` into the range to summarize and the verbatim tail,
    /// cut on turn boundaries (a turn starts at a `User` message).
    pub fn split_for_compaction<'a>(&self, messages: &'a [Message]) -> (&'a [Message], &'a [Message]) {
        let turn_starts: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == MessageRole::User)
            .map(|(i, _)| i)
            .collect();
        if turn_starts.len() <= self.preserve_turns {
            return (&messages[..0], messages);
        }
        let cut = turn_starts[turn_starts.len() - self.preserve_turns];
        messages.split_at(cut)
    }

    /// Synthesizes the compaction ack pair the message reconstructor
    /// recognizes: a user message carrying the summary text, followed by an
    /// assistant acknowledgement.
    pub fn synthesize_summary_messages(summary: &Summary) -> (Message, Message) {
        let user = Message {
            role: MessageRole::User,
            content: vec![ContentBlock::Text {
                text: format!("{COMPACTION_SUMMARY_PREFIX}\n\n{}", summary.summary),
            }],
        };
        let assistant = Message {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::Text {
                text: COMPACTION_ACK_TEXT.to_string(),
            }],
        };
        (user, assistant)
    }
}

fn model_context_limit(model_id: &str) -> i64 {
    if model_id.contains("200k") || model_id.starts_with("claude") {
        200_000
    } else if model_id.contains("128k") {
        128_000
    } else {
        128_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> Message {
        Message {
            role: MessageRole::User,
            content: vec![ContentBlock::Text { text: text.to_string() }],
        }
    }

    #[test]
    fn estimate_uses_chars_over_four() {
        let messages = vec![user(&"a".repeat(400))];
        assert_eq!(estimate_tokens(&messages), 100);
    }

    #[test]
    fn should_compact_triggers_past_seventy_percent_of_the_limit() {
        let manager = ContextManager::default();
        let huge = vec![user(&"a".repeat(4 * 200_000))];
        assert!(manager.should_compact(&huge, "claude-test"));

        let small = vec![user("hi")];
        assert!(!manager.should_compact(&small, "claude-test"));
    }

    #[test]
    fn split_preserves_the_last_n_turns_verbatim() {
        let manager = ContextManager::default().with_preserve_turns(2);
        let messages: Vec<Message> = (0..5).map(|i| user(&format!("turn {i}"))).collect();
        let (older, tail) = manager.split_for_compaction(&messages);
        assert_eq!(older.len(), 3);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn split_keeps_everything_when_under_the_preserve_window() {
        let manager = ContextManager::default().with_preserve_turns(5);
        let messages: Vec<Message> = (0..2).map(|i| user(&format!("turn {i}"))).collect();
        let (older, tail) = manager.split_for_compaction(&messages);
        assert!(older.is_empty());
        assert_eq!(tail.len(), 2);
    }
}
