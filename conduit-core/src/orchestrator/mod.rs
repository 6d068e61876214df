//! Drives one end-to-end turn under an `EventContext` (spec §4.5).

mod waves;

pub use waves::{build_waves, PendingToolCall};

use std::sync::Arc;

use conduit_protocol::message::ContentBlock;
use conduit_protocol::{EventType, Message, MessageRole, TokenUsage};
use conduit_providers::{CompletionRequest, Provider, ProviderRegistry, StopReason, StreamDelta};
use conduit_store::sessions::CounterDelta;
use conduit_store::Store;
use dashmap::DashMap;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::context::{estimate_tokens, ContextManager, Summary};
use crate::error::{EngineError, Result};
use crate::event_context::EventContext;
use crate::interactive::PendingResponseQueue;
use crate::notify::Notifier;
use crate::subagent::{SubagentHandle, SubagentResult, SubagentTracker};
use crate::tool::ExecutionMode;
use crate::tool_executor::ToolExecutor;
use tracing::{debug, info, instrument};

const COMPACTION_SYSTEM_PROMPT: &str = "Summarize the conversation so far for an agent \
continuing the task. Capture key decisions and any files modified; omit pleasantries.";

const DEFAULT_MAX_TURNS: u32 = 25;
const DEFAULT_TOOL_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Preparing,
    Calling,
    Streaming,
    ToolDispatch,
    ToolWait,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub state: TurnState,
    pub stop_reason: Option<StopReason>,
    pub token_usage: TokenUsage,
    pub cost: f64,
    pub context_limit: i64,
}

#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub estimated_tokens: i64,
    pub limit: i64,
    pub message_count: usize,
}

pub struct TurnOrchestratorConfig {
    pub max_turns: u32,
    pub tool_concurrency: usize,
}

impl Default for TurnOrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            tool_concurrency: DEFAULT_TOOL_CONCURRENCY,
        }
    }
}

pub struct TurnOrchestrator {
    store: Arc<Store>,
    providers: Arc<ProviderRegistry>,
    context_manager: ContextManager,
    tools: Arc<ToolExecutor>,
    notifier: Arc<dyn Notifier>,
    cost_table: conduit_providers::CostTable,
    config: TurnOrchestratorConfig,
    subagents: SubagentTracker,
    pending_responses: PendingResponseQueue,
    /// One entry per session with a turn in flight; also the abort switch.
    active_turns: DashMap<String, CancellationToken>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<Store>,
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            subagents: SubagentTracker::new(store.clone(), crate::subagent::SubagentConfig::default()),
            store,
            providers,
            context_manager: ContextManager::default(),
            tools,
            notifier,
            cost_table: conduit_providers::CostTable::default(),
            config: TurnOrchestratorConfig::default(),
            pending_responses: PendingResponseQueue::new(),
            active_turns: DashMap::new(),
        }
    }

    /// Registers a pending interactive-tool reply slot for `tool_call_id`.
    /// A tool implementation awaits the returned receiver from within its
    /// own `Tool::call`; the client answers through `respond_to_tool`.
    pub fn await_tool_response(&self, tool_call_id: &str) -> tokio::sync::oneshot::Receiver<serde_json::Value> {
        self.pending_responses.register(tool_call_id)
    }

    /// Delivers `agent.respond`'s payload to whichever tool call registered
    /// `tool_call_id`. Returns `false` if nothing is waiting.
    pub fn respond_to_tool(&self, tool_call_id: &str, value: serde_json::Value) -> bool {
        self.pending_responses.respond(tool_call_id, value)
    }

    /// Creates a child session under `parent_session_id` and marks it
    /// running, persisting `subagent.spawned`/`subagent.progress` onto the
    /// parent's event stream (spec §4.6/§3.3). Does not run the child's
    /// turn; call `run_subagent_turn` for that, separately, so a caller can
    /// ack the spawn without blocking on the whole child turn.
    #[instrument(skip(self, task), fields(parent_session_id = %parent_session_id))]
    pub async fn begin_subagent(
        &self,
        parent_session_id: &str,
        parent_depth: u32,
        task: &str,
        model: &str,
        spawn_type: conduit_protocol::session::SpawnType,
    ) -> Result<SubagentHandle> {
        let handle = self.subagents.spawn(parent_session_id, parent_depth, task, model, spawn_type).await?;
        self.subagents.mark_running(&handle.child_session_id).await?;
        Ok(handle)
    }

    /// Runs a previously-`begin_subagent`'d child session's turn to
    /// completion and records the outcome, mirroring `subagent.completed`
    /// or `subagent.failed` onto the parent's event stream.
    #[instrument(skip(self, task), fields(child_session_id = %child_session_id))]
    pub async fn run_subagent_turn(&self, child_session_id: &str, provider_name: &str, task: &str) -> Result<()> {
        let started_at = std::time::Instant::now();
        let outcome = self.run_turn(child_session_id, provider_name, task).await;
        let result = match outcome {
            Ok(summary) => SubagentResult {
                success: summary.state == TurnState::Completed,
                output: String::new(),
                summary: None,
                total_turns: 1,
                token_usage: summary.token_usage,
                duration: started_at.elapsed(),
            },
            Err(err) => SubagentResult {
                success: false,
                output: err.to_string(),
                summary: None,
                total_turns: 0,
                token_usage: TokenUsage::default(),
                duration: started_at.elapsed(),
            },
        };
        self.subagents.complete(child_session_id, result).await
    }

    pub fn subagent_state(&self, child_session_id: &str) -> Option<crate::subagent::SubagentState> {
        self.subagents.state(child_session_id)
    }

    pub async fn await_subagent(&self, child_session_id: &str) -> Result<SubagentResult> {
        self.subagents.await_child(child_session_id).await
    }

    pub fn abort(&self, session_id: &str) {
        if let Some(token) = self.active_turns.get(session_id) {
            debug!(session_id = %session_id, "cancelling turn");
            token.cancel();
        }
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.active_turns.contains_key(session_id)
    }

    /// Snapshot of a session's context usage for `context.get` (spec §4.7),
    /// computed from the reconstructed message history, not a live turn.
    pub async fn context_snapshot(&self, session_id: &str) -> Result<ContextSnapshot> {
        let session = self.store.sessions.get(session_id).await?;
        let reconstructed = self.store.reconstruct_session(session_id).await?;
        let estimated_tokens = self.context_manager.estimate(&reconstructed.messages);
        let limit = self.context_manager.get_limit(&session.model_id);
        Ok(ContextSnapshot {
            estimated_tokens,
            limit,
            message_count: reconstructed.messages.len(),
        })
    }

    /// Forces a compaction pass regardless of the threshold (`context.compact`).
    /// Returns an error instead of swallowing it into a warning notification,
    /// since this is an explicit client request rather than an implicit
    /// turn-preparation step.
    pub async fn force_compact(&self, session_id: &str, provider_name: &str) -> Result<()> {
        if self.active_turns.contains_key(session_id) {
            return Err(EngineError::AgentBusy(session_id.to_string()));
        }
        let ctx = EventContext::new(session_id, self.store.clone(), self.notifier.clone());
        let session = self.store.sessions.get(session_id).await?;
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| conduit_providers::ProviderError::ProviderNotFound(provider_name.to_string()))?;
        let reconstructed = self.store.reconstruct_session(session_id).await?;
        self.try_compact(&ctx, &session, &provider, &reconstructed.messages).await
    }

    #[instrument(skip(self, user_text), fields(session_id = %session_id, provider = %provider_name))]
    pub async fn run_turn(
        &self,
        session_id: &str,
        provider_name: &str,
        user_text: &str,
    ) -> Result<TurnSummary> {
        if self.active_turns.contains_key(session_id) {
            return Err(EngineError::AgentBusy(session_id.to_string()));
        }
        let cancellation = CancellationToken::new();
        self.active_turns.insert(session_id.to_string(), cancellation.clone());
        let result = self.run_turn_inner(session_id, provider_name, user_text, cancellation).await;
        self.active_turns.remove(session_id);
        match &result {
            Ok(summary) => info!(state = ?summary.state, cost = summary.cost, "turn finished"),
            Err(err) => debug!(error = %err, "turn failed"),
        }
        result
    }

    async fn run_turn_inner(
        &self,
        session_id: &str,
        provider_name: &str,
        user_text: &str,
        cancellation: CancellationToken,
    ) -> Result<TurnSummary> {
        let ctx = EventContext::new(session_id, self.store.clone(), self.notifier.clone());
        let session = self.store.sessions.get(session_id).await?;
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| conduit_providers::ProviderError::ProviderNotFound(provider_name.to_string()))?;

        // PREPARING: compact the existing history, if needed, before this
        // turn's own message.user event is appended (spec §4.4 / S4).
        let reconstructed = self.store.reconstruct_session(session_id).await?;
        self.maybe_compact(&ctx, &session, &provider, reconstructed.messages).await;

        ctx.persist(
            EventType::MessageUser,
            serde_json::json!({"role": "user", "content": [{"type": "text", "text": user_text}]}),
        )
        .await?;
        ctx.persist(EventType::StreamTurnStart, serde_json::json!({})).await?;
        ctx.emit("agent.turn_start", serde_json::json!({}));

        let mut total_usage = TokenUsage::default();
        let mut total_cost = 0.0;
        let mut turns_run = 0u32;

        loop {
            if cancellation.is_cancelled() {
                return self.abort_turn(&ctx, total_usage, total_cost).await;
            }
            if turns_run >= self.config.max_turns {
                break;
            }
            turns_run += 1;

            let reconstructed = self.store.reconstruct_session(session_id).await?;
            let limit = self.context_manager.get_limit(&session.model_id);

            // CALLING / STREAMING
            let request = CompletionRequest {
                model: session.model_id.clone(),
                system_prompt: String::new(),
                messages: reconstructed.messages,
                tools: Vec::new(),
                max_tokens: 4096,
            };
            let mut stream = provider.stream_completion(request).await?;

            let mut done: Option<(Vec<ContentBlock>, StopReason, conduit_providers::ProviderUsage)> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        return self.abort_turn(&ctx, total_usage, total_cost).await;
                    }
                    delta = stream.next() => {
                        let Some(delta) = delta else { break };
                        match delta? {
                            StreamDelta::TextDelta(text) => {
                                ctx.emit("agent.text_delta", serde_json::json!({"text": text}));
                            }
                            StreamDelta::ThinkingDelta(text) => {
                                ctx.emit("agent.thinking_delta", serde_json::json!({"text": text}));
                            }
                            StreamDelta::ToolUseStart { id, name } => {
                                ctx.emit("agent.tool_start", serde_json::json!({"id": id, "name": name}));
                            }
                            StreamDelta::ToolUseInputDelta { .. } => {}
                            StreamDelta::Done { content, stop_reason, usage } => {
                                done = Some((content, stop_reason, usage));
                                break;
                            }
                        }
                    }
                }
            }

            let Some((content, stop_reason, usage)) = done else {
                return Err(EngineError::Provider(conduit_providers::ProviderError::StreamError(
                    "stream ended without a terminal delta".to_string(),
                )));
            };

            total_usage.accumulate(&usage.usage);
            let cost = self.cost_table.cost_for(&usage);
            total_cost += cost;

            let tool_calls: Vec<PendingToolCall> = content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some(PendingToolCall {
                        tool_call_id: id.clone(),
                        tool_name: name.clone(),
                        arguments: input.clone(),
                        execution_mode: self
                            .tools
                            .get(name)
                            .map(|t| t.schema().execution_mode)
                            .unwrap_or(ExecutionMode::Parallel),
                    }),
                    _ => None,
                })
                .collect();

            if !tool_calls.is_empty() {
                // TOOL_DISPATCH
                for call in &tool_calls {
                    ctx.persist(
                        EventType::ToolCall,
                        serde_json::json!({
                            "tool_call_id": call.tool_call_id,
                            "name": call.tool_name,
                            "arguments": call.arguments,
                        }),
                    )
                    .await?;
                }

                // TOOL_WAIT
                let waves = build_waves(tool_calls);
                for wave in waves {
                    let mut futures = Vec::new();
                    for call in wave {
                        let cancellation = cancellation.clone();
                        futures.push(async move {
                            let outcome = self
                                .tools
                                .execute(session_id, &call.tool_call_id, &call.tool_name, call.arguments, cancellation)
                                .await;
                            (call.tool_call_id, outcome)
                        });
                    }
                    let results = run_bounded(futures, self.config.tool_concurrency).await;
                    for (tool_call_id, outcome) in results {
                        ctx.persist(
                            EventType::ToolResult,
                            serde_json::json!({
                                "tool_call_id": tool_call_id,
                                "content": outcome.content,
                                "isError": outcome.is_error,
                            }),
                        )
                        .await?;
                        ctx.emit(
                            "agent.tool_end",
                            serde_json::json!({"id": tool_call_id, "isError": outcome.is_error}),
                        );
                    }
                }
            }

            let assistant_payload = serde_json::json!({
                "role": "assistant",
                "content": content,
            });
            ctx.persist(EventType::MessageAssistant, assistant_payload).await?;

            self.store
                .sessions
                .increment_counters(
                    session_id,
                    CounterDelta {
                        input_tokens: usage.usage.input_tokens,
                        output_tokens: usage.usage.output_tokens,
                        cache_read_tokens: usage.usage.cache_read_tokens,
                        cache_creation_tokens: usage.usage.cache_creation_tokens,
                        cost,
                        turns: 1,
                        events: 0,
                        messages: 1,
                    },
                )
                .await?;

            if stop_reason != StopReason::ToolUse {
                ctx.persist(
                    EventType::StreamTurnEnd,
                    serde_json::json!({"stopReason": stop_reason}),
                )
                .await?;
                ctx.emit(
                    "agent.turn_complete",
                    serde_json::json!({
                        "stopReason": stop_reason,
                        "tokenUsage": total_usage,
                        "cost": total_cost,
                        "contextLimit": limit,
                    }),
                );
                return Ok(TurnSummary {
                    state: TurnState::Completed,
                    stop_reason: Some(stop_reason),
                    token_usage: total_usage,
                    cost: total_cost,
                    context_limit: limit,
                });
            }
        }

        ctx.persist(EventType::StreamTurnEnd, serde_json::json!({"stopReason": "max_turns"})).await?;
        Ok(TurnSummary {
            state: TurnState::Completed,
            stop_reason: None,
            token_usage: total_usage,
            cost: total_cost,
            context_limit: self.context_manager.get_limit(&session.model_id),
        })
    }

    /// Compacts `messages` in place if over threshold. Failure to summarize
    /// is swallowed into a warning notification; the turn proceeds on the
    /// uncompacted history (spec §4.4 step 5).
    async fn maybe_compact(
        &self,
        ctx: &EventContext,
        session: &conduit_protocol::Session,
        provider: &Arc<dyn Provider>,
        messages: Vec<Message>,
    ) {
        if !self.context_manager.should_compact(&messages, &session.model_id) {
            return;
        }
        ctx.emit("session.status", serde_json::json!({"status": "compacting"}));
        if let Err(err) = self.try_compact(ctx, session, provider, &messages).await {
            ctx.emit("session.warning", serde_json::json!({"reason": err.to_string()}));
        }
    }

    async fn try_compact(
        &self,
        ctx: &EventContext,
        session: &conduit_protocol::Session,
        provider: &Arc<dyn Provider>,
        messages: &[Message],
    ) -> Result<()> {
        let (older, tail) = self.context_manager.split_for_compaction(messages);
        if older.is_empty() {
            return Ok(());
        }
        let before_tokens = estimate_tokens(messages);

        let request = CompletionRequest {
            model: session.model_id.clone(),
            system_prompt: COMPACTION_SYSTEM_PROMPT.to_string(),
            messages: older.to_vec(),
            tools: Vec::new(),
            max_tokens: 1024,
        };
        let mut stream = provider
            .stream_completion(request)
            .await
            .map_err(|e| EngineError::CompactionFailed(e.to_string()))?;

        let mut summary_text = String::new();
        loop {
            let Some(delta) = stream.next().await else {
                return Err(EngineError::CompactionFailed(
                    "summarization stream ended without a terminal delta".to_string(),
                ));
            };
            match delta.map_err(|e| EngineError::CompactionFailed(e.to_string()))? {
                StreamDelta::TextDelta(text) => summary_text.push_str(&text),
                StreamDelta::Done { .. } => break,
                _ => {}
            }
        }

        let summary = Summary {
            summary: summary_text,
            key_decisions: Vec::new(),
            files_modified: Vec::new(),
        };
        let (summary_user, summary_ack) = ContextManager::synthesize_summary_messages(&summary);
        let after_tokens = estimate_tokens(&[summary_user.clone(), summary_ack.clone()]) + estimate_tokens(tail);
        let tokens_saved = (before_tokens - after_tokens).max(0);

        ctx.persist(
            EventType::CompactBoundary,
            serde_json::json!({"rangeSize": older.len(), "tokensSaved": tokens_saved}),
        )
        .await?;
        ctx.persist(
            EventType::CompactSummary,
            serde_json::json!({
                "summary": summary.summary,
                "keyDecisions": summary.key_decisions,
                "filesModified": summary.files_modified,
            }),
        )
        .await?;

        // Everything from `tail` must survive the boundary's "skip
        // everything up to and including me" cutoff, so it is re-appended
        // verbatim as fresh events rather than referenced by position.
        for message in tail {
            let event_type = match message.role {
                MessageRole::User => EventType::MessageUser,
                MessageRole::Assistant => EventType::MessageAssistant,
                MessageRole::System => EventType::MessageSystem,
            };
            let payload = serde_json::to_value(message).map_err(|e| EngineError::CompactionFailed(e.to_string()))?;
            ctx.persist(event_type, payload).await?;
        }

        Ok(())
    }

    async fn abort_turn(
        &self,
        ctx: &EventContext,
        token_usage: TokenUsage,
        cost: f64,
    ) -> Result<TurnSummary> {
        ctx.persist(EventType::NotificationInterrupted, serde_json::json!({})).await?;
        ctx.persist(EventType::StreamTurnEnd, serde_json::json!({"stopReason": "aborted"})).await?;
        Ok(TurnSummary {
            state: TurnState::Aborted,
            stop_reason: None,
            token_usage,
            cost,
            context_limit: 0,
        })
    }
}

/// Runs futures with at most `limit` in flight at once, preserving input
/// order in the output. `futures` are boxed because the closures above
/// capture different lifetimes per call.
async fn run_bounded<T, Fut>(tasks: Vec<Fut>, limit: usize) -> Vec<T>
where
    Fut: std::future::Future<Output = T>,
{
    use futures::stream::StreamExt as _;
    futures::StreamExt::collect(futures::stream::iter(tasks).buffered(limit.max(1))).await
}
