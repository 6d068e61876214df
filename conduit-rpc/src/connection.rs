//! One task pair per WebSocket connection: a read loop that dispatches
//! requests, and a forwarder per subscribed session that drains its
//! `ClientChannel` and writes notifications onto the same socket.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::dispatch::dispatch;
use crate::protocol::{RpcRequest, RpcResponse};
use crate::state::RpcState;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

pub async fn handle_connection(state: Arc<RpcState>, stream: TcpStream) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(error = %err, "websocket handshake failed");
            return;
        }
    };
    let client_id = Uuid::new_v4();
    let (sink, mut read) = ws_stream.split();
    let sink = Arc::new(Mutex::new(sink));
    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(frame) = read.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, %client_id, "websocket read error, closing connection");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let response = match serde_json::from_str::<RpcRequest>(&text) {
            Ok(request) => handle_request(&state, client_id, request, &sink, &mut forwarders).await,
            Err(err) => Some(RpcResponse::err(
                serde_json::Value::Null,
                crate::error::RpcError::ParseError(err.to_string()).to_body(),
            )),
        };

        if let Some(response) = response {
            send(&sink, &response).await;
        }
    }

    for (_, handle) in forwarders.drain() {
        handle.abort();
    }
    state.subscribers.unsubscribe_all(client_id);
}

async fn handle_request(
    state: &Arc<RpcState>,
    client_id: Uuid,
    request: RpcRequest,
    sink: &Arc<Mutex<WsSink>>,
    forwarders: &mut HashMap<String, JoinHandle<()>>,
) -> Option<RpcResponse> {
    match request.method.as_str() {
        "session.subscribe" => {
            let Some(session_id) = request.params.get("sessionId").and_then(|v| v.as_str()).map(String::from) else {
                return Some(RpcResponse::err(
                    request.id,
                    crate::error::RpcError::InvalidParams("missing `sessionId`".to_string()).to_body(),
                ));
            };
            if state.sessions.get(&session_id).await.is_err() {
                return Some(RpcResponse::err(
                    request.id,
                    crate::error::RpcError::InvalidParams(format!("unknown session {session_id}")).to_body(),
                ));
            }
            let channel = state.subscribers.subscribe(&session_id, client_id);
            let forward_sink = sink.clone();
            let handle = tokio::spawn(async move {
                loop {
                    let batch = channel.recv_batch().await;
                    for notification in batch {
                        let Ok(text) = serde_json::to_string(&notification) else { continue };
                        let mut guard = forward_sink.lock().await;
                        if guard.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                }
            });
            if let Some(previous) = forwarders.insert(session_id.clone(), handle) {
                previous.abort();
            }
            Some(RpcResponse::ok(request.id, serde_json::json!({"sessionId": session_id, "subscribed": true})))
        }
        "session.unsubscribe" => {
            let Some(session_id) = request.params.get("sessionId").and_then(|v| v.as_str()).map(String::from) else {
                return Some(RpcResponse::err(
                    request.id,
                    crate::error::RpcError::InvalidParams("missing `sessionId`".to_string()).to_body(),
                ));
            };
            state.subscribers.unsubscribe(&session_id, client_id);
            if let Some(handle) = forwarders.remove(&session_id) {
                handle.abort();
            }
            Some(RpcResponse::ok(request.id, serde_json::json!({"sessionId": session_id, "subscribed": false})))
        }
        _ => Some(dispatch(state, client_id, request).await),
    }
}

async fn send(sink: &Arc<Mutex<WsSink>>, response: &RpcResponse) {
    let Ok(text) = serde_json::to_string(response) else {
        return;
    };
    let mut guard = sink.lock().await;
    let _ = guard.send(Message::Text(text.into())).await;
}
