use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use log::warn;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::NetError;

/// Identity of one accepted or dialled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) enum Outbound {
    Text(String),
    Close,
}

/// Handle for sending text frames down one connection.
///
/// Delivery is serialised per connection through a bounded channel; the
/// write pump on the other end owns the socket.
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Outbound>,
}

impl MessageSender {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    pub async fn send_text(&self, text: String) -> Result<(), NetError> {
        self.tx
            .send(Outbound::Text(text))
            .await
            .map_err(|_| NetError::ChannelClosed)
    }

    /// Non-blocking send; an error means the connection is gone or its
    /// outbound buffer is full.
    pub fn try_send_text(&self, text: String) -> Result<(), NetError> {
        self.tx
            .try_send(Outbound::Text(text))
            .map_err(|_| NetError::ChannelClosed)
    }

    /// Ask the write pump to close the connection.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }
}

/// Events surfaced to the service sitting on an endpoint.
pub enum EndpointEvent {
    Connected(ConnectionId, MessageSender),
    Message(ConnectionId, String),
    Disconnected(ConnectionId),
}

/// Registry of live connections with broadcast support.
///
/// Registration is token-style: `deregister` reports whether the id was
/// still present, so the close path runs its accounting exactly once no
/// matter how many times a tear-down races.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, MessageSender>,
    active: AtomicUsize,
    high_water: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            active: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    pub fn register(&self, id: ConnectionId, sender: MessageSender) {
        if self.connections.insert(id, sender).is_none() {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
        }
    }

    /// Remove a connection. Idempotent: only the call that actually
    /// removes the entry decrements the active count.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn sender(&self, id: ConnectionId) -> Option<MessageSender> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Send to every live connection. Iterates a snapshot of the
    /// senders so no registry lock is held during delivery. Returns how
    /// many connections accepted the frame.
    pub fn broadcast(&self, text: &str) -> usize {
        let snapshot: Vec<(ConnectionId, MessageSender)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in snapshot {
            match sender.try_send_text(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("dropping broadcast frame for stalled connection {}", id),
            }
        }
        delivered
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
