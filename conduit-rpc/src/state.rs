//! Shared state handed to every connection task (spec.md §4.7).

use std::sync::Arc;

use conduit_core::{SessionRegistry, TurnOrchestrator};
use conduit_providers::ProviderRegistry;

use crate::subscribers::SubscriberRegistry;

pub struct RpcState {
    pub sessions: Arc<SessionRegistry>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub providers: Arc<ProviderRegistry>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub default_provider: String,
}

impl RpcState {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        orchestrator: Arc<TurnOrchestrator>,
        providers: Arc<ProviderRegistry>,
        subscribers: Arc<SubscriberRegistry>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            orchestrator,
            providers,
            subscribers,
            default_provider: default_provider.into(),
        }
    }
}
