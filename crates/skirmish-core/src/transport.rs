//! Transport seam and an in-process loopback implementation.
//!
//! The core never talks to sockets. A session is handed a [`Transport`] and
//! only queues frames on it; inbound frames are drained at the start of the
//! next tick.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ProtocolError;
use crate::protocol::NetMessage;
use crate::world::ConnectionId;

pub trait Transport: Send + Sync {
    /// Connection id of this peer.
    fn local_connection(&self) -> ConnectionId;

    /// Every live connection, this peer included, in ascending order.
    fn connected_connection_ids(&self) -> Vec<ConnectionId>;

    /// Sends to every live connection except this peer.
    fn send_to_all(&self, message: &NetMessage) -> Result<(), ProtocolError>;

    fn send_to(&self, connection: ConnectionId, message: &NetMessage) -> Result<(), ProtocolError>;

    /// Takes every frame received since the last call, oldest first.
    fn drain_inbound(&self) -> Vec<(ConnectionId, NetMessage)>;
}

type Frame = (ConnectionId, Vec<u8>);

#[derive(Debug, Default)]
struct HubState {
    queues: BTreeMap<ConnectionId, VecDeque<Frame>>,
}

/// In-process message hub. Every endpoint gets its own inbound queue.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `connection` and returns its endpoint.
    pub fn endpoint(&self, connection: ConnectionId) -> LoopbackEndpoint {
        self.inner.lock().queues.entry(connection).or_default();
        tracing::debug!("[net] Connection {} joined the loopback", connection);
        LoopbackEndpoint {
            hub: Arc::clone(&self.inner),
            connection,
        }
    }

    /// Drops `connection` and any frames still queued for it.
    pub fn disconnect(&self, connection: ConnectionId) {
        if self.inner.lock().queues.remove(&connection).is_some() {
            tracing::debug!("[net] Connection {} left the loopback", connection);
        }
    }

    pub fn connected(&self) -> Vec<ConnectionId> {
        self.inner.lock().queues.keys().copied().collect()
    }

    /// Frames waiting for `connection`.
    pub fn pending(&self, connection: ConnectionId) -> usize {
        self.inner
            .lock()
            .queues
            .get(&connection)
            .map_or(0, VecDeque::len)
    }
}

/// One peer's view of a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackEndpoint {
    hub: Arc<Mutex<HubState>>,
    connection: ConnectionId,
}

impl Transport for LoopbackEndpoint {
    fn local_connection(&self) -> ConnectionId {
        self.connection
    }

    fn connected_connection_ids(&self) -> Vec<ConnectionId> {
        self.hub.lock().queues.keys().copied().collect()
    }

    fn send_to_all(&self, message: &NetMessage) -> Result<(), ProtocolError> {
        let bytes = message.to_bytes()?;
        let mut hub = self.hub.lock();
        for (connection, queue) in &mut hub.queues {
            if *connection != self.connection {
                queue.push_back((self.connection, bytes.clone()));
            }
        }
        Ok(())
    }

    fn send_to(&self, connection: ConnectionId, message: &NetMessage) -> Result<(), ProtocolError> {
        let bytes = message.to_bytes()?;
        match self.hub.lock().queues.get_mut(&connection) {
            Some(queue) => queue.push_back((self.connection, bytes)),
            None => tracing::debug!(
                "[net] Dropping {} for disconnected connection {}",
                message.kind(),
                connection
            ),
        }
        Ok(())
    }

    fn drain_inbound(&self) -> Vec<(ConnectionId, NetMessage)> {
        let frames: Vec<Frame> = match self.hub.lock().queues.get_mut(&self.connection) {
            Some(queue) => queue.drain(..).collect(),
            None => return Vec::new(),
        };

        frames
            .into_iter()
            .filter_map(|(from, bytes)| match NetMessage::from_bytes(&bytes) {
                Ok(message) => Some((from, message)),
                Err(err) => {
                    tracing::warn!("[net] Dropping frame from {}: {}", from, err);
                    None
                }
            })
            .collect()
    }
}
