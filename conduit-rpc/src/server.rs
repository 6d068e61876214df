//! Listener loops: the WebSocket accept loop and a minimal health endpoint
//! sitting on a sibling port (spec.md §6.6). No web framework is pulled in
//! for one `GET /healthz` route; a raw HTTP response is cheaper than a new
//! runtime dependency.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::connection::handle_connection;
use crate::state::RpcState;

pub async fn run_ws_server(state: Arc<RpcState>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(%port, "websocket server listening");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        tracing::debug!(%peer, "accepted connection");
        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(state, stream).await;
        });
    }
}

const HEALTH_BODY_TEMPLATE: &str = "{\"status\":\"ok\",\"version\":\"{version}\"}";

pub async fn run_health_server(port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(%port, "health endpoint listening");
    loop {
        let (mut stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            // Only peeking enough to discard the request line/headers; this
            // listener answers every request the same way regardless of path.
            let _ = stream.read(&mut buf).await;
            let body = HEALTH_BODY_TEMPLATE.replace("{version}", env!("CARGO_PKG_VERSION"));
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}
