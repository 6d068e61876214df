//! Method dispatch table (spec.md §4.7). One function per JSON-RPC method;
//! `dispatch` is the single entry point a connection task calls per request.

use serde_json::Value;
use uuid::Uuid;

use conduit_store::sessions::{ListSessionsFilter, Order, OrderBy};

use crate::error::RpcError;
use crate::protocol::{RpcRequest, RpcResponse};
use crate::state::RpcState;

pub async fn dispatch(state: &RpcState, client_id: Uuid, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    match handle(state, client_id, &request).await {
        Ok(result) => RpcResponse::ok(id, result),
        Err(err) => RpcResponse::err(id, err.to_body()),
    }
}

async fn handle(state: &RpcState, client_id: Uuid, request: &RpcRequest) -> Result<Value, RpcError> {
    match request.method.as_str() {
        "session.create" => session_create(state, &request.params).await,
        "session.list" => session_list(state, &request.params).await,
        "session.get" => session_get(state, &request.params).await,
        "session.fork" => session_fork(state, &request.params).await,
        "session.archive" => session_archive(state, &request.params).await,
        "session.unarchive" => session_unarchive(state, &request.params).await,
        "session.delete" => session_delete(state, &request.params).await,
        "session.subscribe" => session_subscribe(state, client_id, &request.params).await,
        "session.unsubscribe" => session_unsubscribe(state, client_id, &request.params).await,
        "agent.message" => agent_message(state, &request.params).await,
        "agent.abort" => agent_abort(state, &request.params).await,
        "agent.respond" => agent_respond(state, &request.params).await,
        "agent.spawn_subagent" => agent_spawn_subagent(state, &request.params).await,
        "model.list" => model_list(state, &request.params).await,
        "model.switch" => model_switch(state, &request.params).await,
        "context.get" => context_get(state, &request.params).await,
        "context.compact" => context_compact(state, &request.params).await,
        "events.list" => events_list(state, &request.params).await,
        "events.sync" => events_sync(state, &request.params).await,
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::InvalidParams(format!("missing or non-string `{key}`")))
}

fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn opt_i64_param(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

fn opt_bool_param(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

async fn session_create(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let workspace_path = str_param(params, "workspacePath")?;
    let workspace_name = opt_str_param(params, "workspaceName").unwrap_or(workspace_path);
    let model = str_param(params, "model")?;
    let title = opt_str_param(params, "title");
    let tags: Vec<String> = params
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let session = state.sessions.create(workspace_path, workspace_name, model, title, &tags).await?;
    Ok(serde_json::to_value(session)?)
}

async fn session_list(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let filter = ListSessionsFilter {
        workspace_id: opt_str_param(params, "workspaceId").map(String::from),
        archived: opt_bool_param(params, "archived"),
        limit: opt_i64_param(params, "limit").unwrap_or(50),
        offset: opt_i64_param(params, "offset").unwrap_or(0),
        order_by: Some(OrderBy::LastActivityAt),
        order: Some(Order::Desc),
    };
    let summaries = state.sessions.list_summaries(&filter).await?;
    Ok(serde_json::to_value(summaries)?)
}

async fn session_get(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let session = state.sessions.get(session_id).await?;
    Ok(serde_json::to_value(session)?)
}

async fn session_fork(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let from_event_id = match params.get("fromEventId").and_then(|v| v.as_str()) {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|e| RpcError::InvalidParams(e.to_string()))?),
        None => None,
    };
    let session = state.sessions.fork(session_id, from_event_id).await?;
    Ok(serde_json::to_value(session)?)
}

async fn session_archive(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    state.sessions.archive(session_id).await?;
    Ok(serde_json::json!({"sessionId": session_id, "archived": true}))
}

async fn session_unarchive(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    state.sessions.unarchive(session_id).await?;
    Ok(serde_json::json!({"sessionId": session_id, "archived": false}))
}

async fn session_delete(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    state.sessions.delete(session_id).await?;
    state.subscribers.publish(session_id, crate::protocol::RpcNotification::new("session.deleted", serde_json::json!({"sessionId": session_id})));
    Ok(serde_json::json!({"sessionId": session_id, "deleted": true}))
}

async fn session_subscribe(state: &RpcState, client_id: Uuid, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    // Confirms the session exists before a client starts listening on it.
    state.sessions.get(session_id).await?;
    state.subscribers.subscribe(session_id, client_id);
    Ok(serde_json::json!({"sessionId": session_id, "subscribed": true}))
}

async fn session_unsubscribe(state: &RpcState, client_id: Uuid, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    state.subscribers.unsubscribe(session_id, client_id);
    Ok(serde_json::json!({"sessionId": session_id, "subscribed": false}))
}

/// Enqueues the turn and acks immediately; progress and the eventual
/// result arrive as `agent.*` notifications on the session's subscription,
/// not as this call's response (spec §4.7's "immediate ack, progress via
/// notifications" contract — blocking here would starve `agent.abort` sent
/// on the same connection while a turn is in flight).
async fn agent_message(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?.to_string();
    let text = str_param(params, "text")?.to_string();
    let provider = opt_str_param(params, "provider").unwrap_or(&state.default_provider).to_string();

    if state.orchestrator.is_busy(&session_id) {
        return Err(conduit_core::EngineError::AgentBusy(session_id).into());
    }

    let orchestrator = state.orchestrator.clone();
    let subscribers = state.subscribers.clone();
    let notify_session_id = session_id.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_turn(&notify_session_id, &provider, &text).await {
            subscribers.publish(
                &notify_session_id,
                crate::protocol::RpcNotification::new("agent.turn_failed", serde_json::json!({"reason": err.to_string()})),
            );
        }
    });

    Ok(serde_json::json!({"sessionId": session_id, "accepted": true}))
}

async fn agent_abort(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    state.orchestrator.abort(session_id);
    Ok(serde_json::json!({"sessionId": session_id, "aborted": true}))
}

/// Delivers an interactive tool's reply (spec.md §4.7 method surface).
async fn agent_respond(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let tool_call_id = str_param(params, "toolCallId")?;
    let response = params.get("response").cloned().unwrap_or(serde_json::Value::Null);
    let delivered = state.orchestrator.respond_to_tool(tool_call_id, response);
    Ok(serde_json::json!({"toolCallId": tool_call_id, "delivered": delivered}))
}

async fn agent_spawn_subagent(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let parent_session_id = str_param(params, "sessionId")?.to_string();
    let task = str_param(params, "task")?.to_string();
    let model = opt_str_param(params, "model").unwrap_or("").to_string();
    let provider = opt_str_param(params, "provider").unwrap_or(&state.default_provider).to_string();
    let parent_depth = opt_i64_param(params, "parentDepth").unwrap_or(0) as u32;

    let parent = state.sessions.get(&parent_session_id).await?;
    let model = if model.is_empty() { parent.model_id.clone() } else { model };

    let handle = state
        .orchestrator
        .begin_subagent(&parent_session_id, parent_depth, &task, &model, conduit_protocol::session::SpawnType::Subsession)
        .await?;

    let orchestrator = state.orchestrator.clone();
    let subscribers = state.subscribers.clone();
    let child_session_id = handle.child_session_id.clone();
    let notify_parent_id = parent_session_id.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_subagent_turn(&child_session_id, &provider, &task).await {
            subscribers.publish(
                &notify_parent_id,
                crate::protocol::RpcNotification::new(
                    "subagent.failed",
                    serde_json::json!({"childSessionId": child_session_id, "reason": err.to_string()}),
                ),
            );
        }
    });

    Ok(serde_json::json!({"childSessionId": handle.child_session_id}))
}

async fn model_list(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let provider_name = str_param(params, "provider")?;
    let provider = state
        .providers
        .get(provider_name)
        .ok_or_else(|| RpcError::InvalidParams(format!("unknown provider `{provider_name}`")))?;
    let models = provider.list_models().await.map_err(|e| RpcError::Engine(conduit_core::EngineError::Provider(e)))?;
    Ok(serde_json::to_value(models)?)
}

async fn model_switch(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let model = str_param(params, "model")?;
    let session = state.sessions.switch_model(session_id, model).await?;
    Ok(serde_json::to_value(session)?)
}

async fn context_get(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let snapshot = state.orchestrator.context_snapshot(session_id).await?;
    Ok(serde_json::json!({
        "estimatedTokens": snapshot.estimated_tokens,
        "limit": snapshot.limit,
        "messageCount": snapshot.message_count,
    }))
}

async fn context_compact(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let provider = opt_str_param(params, "provider").unwrap_or(&state.default_provider);
    state.orchestrator.force_compact(session_id, provider).await?;
    Ok(serde_json::json!({"sessionId": session_id, "compacted": true}))
}

async fn events_list(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let limit = opt_i64_param(params, "limit");
    let offset = opt_i64_param(params, "offset");
    let events = state.sessions.list_events(session_id, limit, offset).await?;
    Ok(serde_json::to_value(events)?)
}

async fn events_sync(state: &RpcState, params: &Value) -> Result<Value, RpcError> {
    let session_id = str_param(params, "sessionId")?;
    let after_sequence = opt_i64_param(params, "afterSequence").unwrap_or(0);
    let limit = opt_i64_param(params, "limit").unwrap_or(500);
    let events = state.sessions.list_events_after(session_id, after_sequence, limit).await?;
    Ok(serde_json::to_value(events)?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use conduit_core::{BroadcastNotifier, SessionRegistry, ToolExecutor, TurnOrchestrator};
    use conduit_hooks::HookManager;
    use conduit_providers::{MockProvider, ProviderRegistry};
    use conduit_store::{ConnectionConfig, Store};

    use super::*;
    use crate::protocol::RpcRequest;
    use crate::subscribers::SubscriberRegistry;

    async fn state() -> RpcState {
        let store = Arc::new(Store::open_in_memory(&ConnectionConfig::default()).await.unwrap());
        let sessions = Arc::new(SessionRegistry::new(store.clone()));
        let providers = Arc::new(ProviderRegistry::new());
        providers.register(Arc::new(MockProvider::new("mock")));
        let tools = Arc::new(ToolExecutor::new(Arc::new(HookManager::new()), store.blobs.clone()));
        let notifier = Arc::new(BroadcastNotifier::default());
        let orchestrator = Arc::new(TurnOrchestrator::new(store.clone(), providers.clone(), tools, notifier));
        RpcState::new(sessions, orchestrator, providers, Arc::new(SubscriberRegistry::new()), "mock")
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: serde_json::json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn session_create_then_get_round_trips_through_dispatch() {
        let state = state().await;
        let created = dispatch(
            &state,
            Uuid::new_v4(),
            request("session.create", serde_json::json!({"workspacePath": "/tmp/ws", "model": "claude-test"})),
        )
        .await;
        let session_id = created.result.unwrap()["id"].as_str().unwrap().to_string();

        let fetched = dispatch(&state, Uuid::new_v4(), request("session.get", serde_json::json!({"sessionId": session_id}))).await;
        assert_eq!(fetched.result.unwrap()["id"], session_id);
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let state = state().await;
        let response = dispatch(&state, Uuid::new_v4(), request("bogus.method", serde_json::json!({}))).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn session_get_on_a_missing_session_maps_to_session_not_found() {
        let state = state().await;
        let response = dispatch(&state, Uuid::new_v4(), request("session.get", serde_json::json!({"sessionId": "sess_missing"}))).await;
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn missing_required_param_maps_to_invalid_params() {
        let state = state().await;
        let response = dispatch(&state, Uuid::new_v4(), request("session.get", serde_json::json!({}))).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn model_switch_updates_the_sessions_model_id() {
        let state = state().await;
        let created = dispatch(
            &state,
            Uuid::new_v4(),
            request("session.create", serde_json::json!({"workspacePath": "/tmp/ws", "model": "claude-test"})),
        )
        .await;
        let session_id = created.result.unwrap()["id"].as_str().unwrap().to_string();

        let switched = dispatch(
            &state,
            Uuid::new_v4(),
            request("model.switch", serde_json::json!({"sessionId": session_id, "model": "claude-other"})),
        )
        .await;
        assert_eq!(switched.result.unwrap()["model_id"], "claude-other");
    }

    #[tokio::test]
    async fn events_list_returns_the_session_creation_event() {
        let state = state().await;
        let created = dispatch(
            &state,
            Uuid::new_v4(),
            request("session.create", serde_json::json!({"workspacePath": "/tmp/ws", "model": "claude-test"})),
        )
        .await;
        let session_id = created.result.unwrap()["id"].as_str().unwrap().to_string();

        let events = dispatch(&state, Uuid::new_v4(), request("events.list", serde_json::json!({"sessionId": session_id}))).await;
        assert!(events.result.unwrap().as_array().is_some());
    }

    #[tokio::test]
    async fn context_get_reports_zero_messages_for_a_fresh_session() {
        let state = state().await;
        let created = dispatch(
            &state,
            Uuid::new_v4(),
            request("session.create", serde_json::json!({"workspacePath": "/tmp/ws", "model": "claude-test"})),
        )
        .await;
        let session_id = created.result.unwrap()["id"].as_str().unwrap().to_string();

        let context = dispatch(&state, Uuid::new_v4(), request("context.get", serde_json::json!({"sessionId": session_id}))).await;
        assert_eq!(context.result.unwrap()["messageCount"], 0);
    }
}
