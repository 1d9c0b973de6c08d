//! WebSocket handler for live list updates.
//!
//! A connection subscribes to one entity service and receives every list
//! replacement as a `snapshot` message, plus `connectivity` messages when
//! the network monitor flips. Clients may ask for a `refresh` of a group or
//! `ping` the server.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bandsync_engine::Entity;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::network::{Connectivity, NetworkMonitor};
use crate::service::{EntitySyncService, SyncStatus};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Re-load a group; the result arrives as a snapshot if the list changed.
    Refresh {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage<T> {
    Snapshot { records: Vec<T> },
    Connectivity { change: Connectivity },
    Status { status: SyncStatus },
    Error { message: String },
    Pong,
}

/// Handle an established WebSocket connection for `service`.
///
/// The current list is sent right away.
pub async fn stream_snapshots<T: Entity>(
    socket: WebSocket,
    service: Arc<EntitySyncService<T>>,
    network: Arc<NetworkMonitor>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<LiveMessage<T>>();

    let mut subscription = service.subscribe();
    let subscriber_id = subscription.id();
    let collection = T::schema().collection.as_str();

    tracing::info!(
        subscriber_id,
        collection,
        "WebSocket client connected"
    );

    // Forward list replacements
    let snapshot_tx = tx.clone();
    let snapshot_task = tokio::spawn(async move {
        while let Some(records) = subscription.recv().await {
            let message = LiveMessage::Snapshot {
                records: records.to_vec(),
            };
            if snapshot_tx.send(message).is_err() {
                break;
            }
        }
    });

    // Forward connectivity changes
    let mut transitions = network.transitions();
    let connectivity_tx = tx.clone();
    let connectivity_task = tokio::spawn(async move {
        loop {
            match transitions.recv().await {
                Ok(change) => {
                    if connectivity_tx
                        .send(LiveMessage::Connectivity { change })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Connectivity updates lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Forward queued messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &service).await;
                if let Some(response) = response {
                    // The send task only stops once the socket is gone
                    let _ = tx.send(response);
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(subscriber_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(subscriber_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Aborting the forwarder drops the subscription, which unsubscribes
    snapshot_task.abort();
    connectivity_task.abort();
    send_task.abort();

    tracing::info!(
        subscriber_id,
        collection,
        "WebSocket client disconnected"
    );
}

/// Process a client message and return the reply, if any.
async fn process_message<T: Entity>(
    text: &str,
    service: &EntitySyncService<T>,
) -> Option<LiveMessage<T>> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return Some(LiveMessage::Error {
                message: format!("Invalid message format: {}", e),
            });
        }
    };

    match client_msg {
        ClientMessage::Refresh { group_id } => {
            service.fetch(&group_id).await;
            Some(LiveMessage::Status {
                status: service.status(),
            })
        }
        ClientMessage::Ping => Some(LiveMessage::Pong),
    }
}
