//! Connection Registry
//!
//! Maps player ids to the outbound half of their transport. Delivery is
//! split in two steps so the room lock is never held while sending:
//! [`ConnectionRegistry::targets`] snapshots senders under the lock and
//! [`deliver`] pushes the message after the guard is dropped.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;

/// Outbound channel of one connection.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// A live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Message sender (drained by the connection's writer task).
    pub sender: Outbound,
    /// Remote address, if the transport has one.
    pub peer: Option<SocketAddr>,
    /// When the connection was accepted.
    pub connected_at: Instant,
}

impl Connection {
    /// Wrap an outbound channel.
    pub fn new(sender: Outbound, peer: Option<SocketAddr>) -> Self {
        Self {
            sender,
            peer,
            connected_at: Instant::now(),
        }
    }
}

/// Live connections keyed by player id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<PlayerId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn insert(&mut self, id: PlayerId, connection: Connection) {
        self.connections.insert(id, connection);
    }

    /// Unregister a connection.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Is this id connected?
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.connections.contains_key(id)
    }

    /// Connection count.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connected ids in order.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.connections.keys().copied().collect()
    }

    /// Sender for a single connection.
    pub fn target(&self, id: &PlayerId) -> Option<(PlayerId, Outbound)> {
        self.connections.get(id).map(|c| (*id, c.sender.clone()))
    }

    /// Snapshot of every sender except `exclude`.
    pub fn targets(&self, exclude: Option<PlayerId>) -> Vec<(PlayerId, Outbound)> {
        self.connections
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, c)| (*id, c.sender.clone()))
            .collect()
    }

    /// Drop every connection, returning their senders.
    pub fn drain(&mut self) -> Vec<(PlayerId, Outbound)> {
        std::mem::take(&mut self.connections)
            .into_iter()
            .map(|(id, c)| (id, c.sender))
            .collect()
    }
}

/// Push `message` to every target without blocking.
///
/// Returns the ids whose channel is closed; the caller treats those as
/// disconnected. A full channel only drops this one message.
pub fn deliver(targets: &[(PlayerId, Outbound)], message: &ServerMessage) -> Vec<PlayerId> {
    let mut closed = Vec::new();
    for (id, sender) in targets {
        match sender.try_send(message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, dropping {}", id, message.event_name());
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound channel closed for {}", id);
                closed.push(*id);
            }
        }
    }
    closed
}
