//! Hook registration and LIFO dispatch.
//!
//! Ordering when more than one hook is registered for a phase is LIFO: the
//! most recently registered hook runs first, and the first `Deny` short-
//! circuits the remaining hooks in that phase (SPEC_FULL.md §4.9).

use std::sync::Arc;

use conduit_protocol::hooks::{HookDecision, HookPhase};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::context::HookContext;
use crate::hook::Hook;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("tool call denied by hook {hook}: {reason}")]
    Denied { hook: String, reason: String },
}

#[derive(Default)]
pub struct HookManager {
    pre_tool_use: RwLock<Vec<Arc<dyn Hook>>>,
    post_tool_use: RwLock<Vec<Arc<dyn Hook>>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, phase: HookPhase, hook: Arc<dyn Hook>) {
        let list = match phase {
            HookPhase::PreToolUse => &self.pre_tool_use,
            HookPhase::PostToolUse => &self.post_tool_use,
        };
        list.write().await.push(hook);
    }

    /// Runs `PreToolUse` hooks most-recently-registered first. Returns the
    /// denying hook's reason on the first `Deny`.
    pub async fn trigger_pre_tool_use(&self, ctx: &HookContext) -> Result<(), HookError> {
        let hooks = self.pre_tool_use.read().await;
        for hook in hooks.iter().rev() {
            tracing::debug!(hook = hook.name(), tool = %ctx.tool_name, "running preToolUse hook");
            if let HookDecision::Deny { reason } = hook.pre_tool_use(ctx).await {
                return Err(HookError::Denied {
                    hook: hook.name().to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// `PostToolUse` hooks are observational; none can alter the result, so
    /// failures (panics aside) are impossible by construction and nothing
    /// short-circuits the remaining hooks.
    pub async fn trigger_post_tool_use(&self, ctx: &HookContext) {
        let hooks = self.post_tool_use.read().await;
        for hook in hooks.iter().rev() {
            hook.post_tool_use(ctx).await;
        }
    }
}
