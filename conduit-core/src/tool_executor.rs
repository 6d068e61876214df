//! Validates, dispatches, times out, and classifies tool calls (spec §4.9).
//! Hooks observe or deny without touching the tool implementation.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_hooks::{HookContext, HookManager};
use conduit_protocol::blob::LARGE_CONTENT_THRESHOLD_BYTES;
use conduit_store::BlobStore;
use tokio_util::sync::CancellationToken;

use crate::tool::{Tool, ToolError, ToolOutcome};
use tracing::{debug, instrument};

pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
    hooks: Arc<HookManager>,
    blobs: BlobStore,
}

/// The result recorded as a `tool.result` event. Large content is
/// blob-stored and referenced rather than inlined.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    pub content_blob_id: Option<String>,
}

impl ToolExecutor {
    pub fn new(hooks: Arc<HookManager>, blobs: BlobStore) -> Self {
        Self {
            tools: HashMap::new(),
            hooks,
            blobs,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.schema().name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    #[instrument(skip(self, arguments, cancellation), fields(session_id = %session_id, tool_call_id = %tool_call_id, tool_name = %tool_name))]
    pub async fn execute(
        &self,
        session_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        cancellation: CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(tool_name) else {
            return ToolResult {
                content: format!("unknown tool '{tool_name}'"),
                is_error: true,
                content_blob_id: None,
            };
        };

        let pre = HookContext::pre_tool_use(session_id, tool_name, tool_call_id, arguments.clone());
        if let Err(denial) = self.hooks.trigger_pre_tool_use(&pre).await {
            return ToolResult {
                content: denial.to_string(),
                is_error: true,
                content_blob_id: None,
            };
        }

        let schema = tool.schema();
        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(ToolError::Cancelled),
            result = tokio::time::timeout(schema.timeout, tool.call(arguments, cancellation.clone())) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ToolError::Timeout(schema.timeout)),
                }
            }
        };

        let (content, is_error) = match outcome {
            Ok(ToolOutcome { content, is_error }) => (content, is_error),
            Err(ToolError::Cancelled) => ("cancelled".to_string(), true),
            Err(err) => {
                debug!(error = %err, "tool call failed");
                (err.to_string(), true)
            }
        };

        let content_blob_id = if content.len() > LARGE_CONTENT_THRESHOLD_BYTES {
            self.blobs.store(content.as_bytes(), "text/plain").await.ok()
        } else {
            None
        };

        let post = pre.post_tool_use(serde_json::json!({"content": content, "isError": is_error}));
        self.hooks.trigger_post_tool_use(&post).await;

        ToolResult {
            content,
            is_error,
            content_blob_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::EchoTool;
    use conduit_store::ConnectionConfig;

    async fn executor() -> ToolExecutor {
        let store = conduit_store::Store::open_in_memory(&ConnectionConfig::default())
            .await
            .unwrap();
        let mut executor = ToolExecutor::new(Arc::new(HookManager::new()), store.blobs);
        executor.register(Arc::new(EchoTool));
        executor
    }

    #[tokio::test]
    async fn unknown_tool_returns_an_error_result_without_panicking() {
        let executor = executor().await;
        let result = executor
            .execute("sess", "t1", "missing", serde_json::json!({}), CancellationToken::new())
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn a_cancelled_call_reports_the_literal_cancelled_string() {
        let executor = executor().await;
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = executor
            .execute("sess", "t1", "echo", serde_json::json!({"text": "hi"}), cancellation)
            .await;
        assert!(result.is_error);
        assert_eq!(result.content, "cancelled");
    }

    #[tokio::test]
    async fn registered_tool_executes_and_returns_content() {
        let executor = executor().await;
        let result = executor
            .execute(
                "sess",
                "t1",
                "echo",
                serde_json::json!({"text": "hi"}),
                CancellationToken::new(),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn a_deny_hook_short_circuits_before_the_tool_runs() {
        use async_trait::async_trait;
        use conduit_hooks::Hook;
        use conduit_protocol::HookDecision;

        struct DenyAll;
        #[async_trait]
        impl Hook for DenyAll {
            fn name(&self) -> &str {
                "deny-all"
            }
            async fn pre_tool_use(&self, _ctx: &HookContext) -> HookDecision {
                HookDecision::Deny {
                    reason: "not allowed".to_string(),
                }
            }
        }

        let store = conduit_store::Store::open_in_memory(&ConnectionConfig::default())
            .await
            .unwrap();
        let hooks = Arc::new(HookManager::new());
        hooks
            .register(conduit_protocol::HookPhase::PreToolUse, Arc::new(DenyAll))
            .await;
        let mut executor = ToolExecutor::new(hooks, store.blobs);
        executor.register(Arc::new(EchoTool));

        let result = executor
            .execute(
                "sess",
                "t1",
                "echo",
                serde_json::json!({"text": "hi"}),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not allowed"));
    }
}
