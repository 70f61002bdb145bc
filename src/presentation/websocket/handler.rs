//! WebSocket Connection Handler
//!
//! Upgrades HTTP requests and runs the per-socket read and write loops.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};

use super::connection::Outbound;
use super::gateway::Gateway;
use super::messages::CloseCode;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limits = &state.settings.websocket;
    let gateway = state.gateway.clone();

    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, gateway))
}

fn close_message(code: CloseCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.code(),
        reason: "".into(),
    }))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>) {
    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    let (conn, mut outbound) = match gateway.open() {
        Ok(opened) => opened,
        Err(e) => {
            tracing::debug!(error = %e, "Refusing WebSocket connection");
            let _ = sender.send(close_message(CloseCode::Normal)).await;
            return;
        }
    };
    let connection_id = conn.id();

    // Single writer: frames reach the socket in queue order
    let writer = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(connection_id, "Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code) => {
                    let _ = sender.send(close_message(code)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            biased;

            _ = conn.closed() => break,

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_text(&conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id, "Binary frame received");
                        gateway.bus().drop_connection(&conn, CloseCode::BadPayload);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id, "Connection closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are handled by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    gateway.bus().drop_connection(&conn, CloseCode::Normal);
    gateway.bus().detach(&conn);
    if writer.await.is_err() {
        tracing::warn!(connection_id, "Socket writer panicked");
    }

    tracing::debug!(connection_id, user_id = ?conn.user_id(), "WebSocket disconnected");
}
