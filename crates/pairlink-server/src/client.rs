use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use pairlink_core::collaborators::Outbox;
use pairlink_core::{ConnectionId, Inbound, Outbound, RelayError};
use tokio::sync::mpsc;

use crate::relay::RelayMessage;

/// Registry of all connected WebSocket clients, keyed by connection id.
///
/// Holds only the outgoing queue for each connection; pairing state lives in
/// the relay task.
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, mpsc::Sender<String>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID + receiver for outgoing frames.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients.insert(id.clone(), tx);
        (id, rx)
    }

    pub fn unregister(&self, id: &ConnectionId) {
        self.clients.remove(id);
    }

    /// Queue a frame for a client without waiting. Drops the frame if the
    /// client's queue is full or the client is gone.
    pub fn send_to(&self, id: &ConnectionId, frame: String) -> bool {
        let Some(tx) = self.clients.get(id).map(|entry| entry.value().clone()) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(
                    conn_id = %id,
                    frame_len = frame.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

impl Outbox for ClientRegistry {
    fn emit(&self, to: &ConnectionId, event: &Outbound) -> bool {
        let Some(frame) = event.to_frame() else {
            tracing::error!(conn_id = %to, event = event.name(), "failed to serialize event");
            return false;
        };
        let sent = self.send_to(to, frame);
        if !sent {
            tracing::debug!(conn_id = %to, event = event.name(), "event not delivered");
        }
        sent
    }
}

/// Classify one inbound socket frame for the relay queue.
fn classify_frame(conn: &ConnectionId, msg: WsMessage) -> Option<RelayMessage> {
    match msg {
        WsMessage::Text(text) => Some(match Inbound::parse(text.as_str()) {
            Ok(inbound) => RelayMessage::Event(conn.clone(), inbound),
            Err(err) => RelayMessage::Rejected(conn.clone(), err),
        }),
        WsMessage::Binary(_) => Some(RelayMessage::Rejected(conn.clone(), RelayError::MalformedEvent)),
        // axum answers pings itself
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) => None,
    }
}

/// Handle a WebSocket connection: split into reader/writer and feed the
/// relay queue until either side ends, then enqueue the disconnect.
pub async fn handle_ws_connection(
    socket: WebSocket,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    relay_tx: mpsc::Sender<RelayMessage>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket
    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader task: forward frames to the relay in receive order
    let reader_cid = conn_id.clone();
    let reader_tx = relay_tx.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
            if let Some(relay_msg) = classify_frame(&reader_cid, msg) {
                if reader_tx.send(relay_msg).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&conn_id);
    tracing::info!(conn_id = %conn_id, "WebSocket client disconnected");

    if relay_tx
        .send(RelayMessage::Event(conn_id.clone(), Inbound::Disconnect))
        .await
        .is_err()
    {
        tracing::warn!(conn_id = %conn_id, "relay stopped before disconnect was delivered");
    }
}
