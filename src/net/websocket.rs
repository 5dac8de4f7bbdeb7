//! WebSocket client registry and connection handling
//!
//! Each accepted connection gets a private channel; broadcasting fans a
//! payload out over every channel. Closed channels are swept by the
//! consumer's periodic prune.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::stream::NetworkSink;

/// Fan-out point for binary audio payloads
pub struct WsBroadcaster {
    clients: DashMap<Uuid, UnboundedSender<Message>>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Add a client; returns its id and the receiving end of its channel
    pub fn register(&self) -> (Uuid, UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        (id, rx)
    }

    /// Remove a client
    pub fn unregister(&self, id: &Uuid) {
        self.clients.remove(id);
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSink for WsBroadcaster {
    fn broadcast_binary(&self, payload: Bytes) {
        for entry in self.clients.iter() {
            // A send to a gone client fails silently; the next prune
            // removes the entry
            let _ = entry.value().send(Message::Binary(payload.to_vec()));
        }
    }

    fn prune_stale(&self) {
        self.clients.retain(|_, tx| !tx.is_closed());
    }

    fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Drive one accepted WebSocket connection until either side closes.
pub async fn handle_socket(socket: WebSocket, broadcaster: Arc<WsBroadcaster>) {
    let (id, mut payload_rx) = broadcaster.register();
    tracing::info!(client = %id, "websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = payload_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // The data plane is one-way; inbound frames are drained and dropped
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.unregister(&id);
    tracing::info!(client = %id, "websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_client() {
        let broadcaster = WsBroadcaster::new();
        let (_id_a, mut rx_a) = broadcaster.register();
        let (_id_b, mut rx_b) = broadcaster.register();
        assert_eq!(broadcaster.client_count(), 2);

        broadcaster.broadcast_binary(Bytes::from_static(&[1, 2, 3]));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv() {
                Ok(Message::Binary(data)) => assert_eq!(data, vec![1, 2, 3]),
                other => panic!("expected binary payload, got {:?}", other),
            }
        }
    }

    #[test]
    fn prune_drops_closed_clients() {
        let broadcaster = WsBroadcaster::new();
        let (_id_a, rx_a) = broadcaster.register();
        let (_id_b, _rx_b) = broadcaster.register();

        drop(rx_a);
        broadcaster.prune_stale();

        assert_eq!(broadcaster.client_count(), 1);
    }

    #[test]
    fn unregister_removes_client() {
        let broadcaster = WsBroadcaster::new();
        let (id, _rx) = broadcaster.register();

        broadcaster.unregister(&id);
        assert_eq!(broadcaster.client_count(), 0);

        // Broadcasting to nobody is fine
        broadcaster.broadcast_binary(Bytes::from_static(&[0]));
    }
}
