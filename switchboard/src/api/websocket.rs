//! WebSocket endpoint for the realtime progress channel
//!
//! Observers are write-mostly: the hub pushes events through a per-socket
//! writer task, while the read loop only services ping/pong and notices
//! the close. Reconnecting observers get a fresh handshake and no replay.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;

use crate::api::ApiState;
use crate::hub::BroadcastHub;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: BroadcastHub) {
    let (client_id, mut rx) = hub.register().await;
    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&text).unwrap_or_else(|_| json!({}));
                if parsed.get("type").and_then(|v| v.as_str()) == Some("ping") {
                    hub.send_to(&client_id, Message::Text(json!({"type": "pong"}).to_string().into()))
                        .await;
                }
            }
            Ok(Message::Ping(data)) => {
                hub.send_to(&client_id, Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(client_id = %client_id.as_str(), error = %e, "websocket receive error");
                break;
            }
        }
    }

    hub.unregister(&client_id).await;
    writer.abort();
}
