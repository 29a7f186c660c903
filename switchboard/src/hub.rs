//! Broadcast hub - live observer registry and event fan-out
//!
//! Every event goes to every registered observer, system-wide; there is no
//! per-task subscription filtering. Fan-out is best-effort and at-most-once
//! per observer: a connection whose channel is gone is pruned on the spot
//! and the loss is never surfaced to the broadcaster.

use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use shared_types::{ClientId, WsEvent};

/// Connection registry. Cloning shares the registry, so the API layer and
/// the processor see the same set of observers.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    connections: Arc<Mutex<HashMap<ClientId, mpsc::UnboundedSender<Message>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. Assigns a fresh client id and immediately
    /// queues the `connected` handshake on the returned channel.
    pub async fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<Message>) {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let handshake = WsEvent::Connected {
            client_id: client_id.0.clone(),
        };
        match serde_json::to_string(&handshake) {
            Ok(json) => {
                let _ = tx.send(Message::Text(json.into()));
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize handshake"),
        }

        self.connections.lock().await.insert(client_id.clone(), tx);
        tracing::info!(client_id = %client_id.as_str(), "observer connected");
        (client_id, rx)
    }

    pub async fn unregister(&self, client_id: &ClientId) {
        if self.connections.lock().await.remove(client_id).is_some() {
            tracing::info!(client_id = %client_id.as_str(), "observer disconnected");
        }
    }

    /// Send a message to one observer; dead connections are ignored here
    /// and swept on the next broadcast.
    pub async fn send_to(&self, client_id: &ClientId, message: Message) {
        if let Some(tx) = self.connections.lock().await.get(client_id) {
            let _ = tx.send(message);
        }
    }

    /// Serialize the event once, then push it to every observer. Connections
    /// whose receiver is gone are deregistered immediately; errors never
    /// propagate to the caller.
    pub async fn broadcast(&self, event: &WsEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize broadcast event");
                return;
            }
        };

        let mut connections = self.connections.lock().await;
        connections.retain(|client_id, tx| {
            let alive = tx.send(Message::Text(json.clone().into())).is_ok();
            if !alive {
                tracing::warn!(
                    client_id = %client_id.as_str(),
                    "pruning dead observer connection"
                );
            }
            alive
        });
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}
