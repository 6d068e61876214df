//! The `Hook` trait observers/gatekeepers implement.

use async_trait::async_trait;
use conduit_protocol::hooks::HookDecision;

use crate::context::HookContext;

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    /// Runs synchronously before dispatch. May deny the call. The default
    /// always allows, so observational hooks don't need to override it.
    async fn pre_tool_use(&self, _ctx: &HookContext) -> HookDecision {
        HookDecision::Allow
    }

    /// Runs after a result is produced. Observational only — the return
    /// value cannot change the result (spec §4.9).
    async fn post_tool_use(&self, _ctx: &HookContext) {}
}
