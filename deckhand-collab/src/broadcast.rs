//! Room fan-out.
//!
//! One [`BroadcastGroup`] per document room, backed by a tokio broadcast
//! channel. A message is JSON-encoded once and every subscriber receives the
//! same shared frame, so a snapshot costs one encode plus O(members) sends.
//! Receivers that fall more than `capacity` frames behind lag and lose the
//! oldest frames.
//!
//! Rooms deliver to every member, the originator included.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::model::ConnectionId;
use crate::protocol::{ProtocolError, ServerMessage};

/// Encoded server message, shared between all receivers.
pub type Frame = Arc<str>;

pub type FrameReceiver = broadcast::Receiver<Frame>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub active_peers: usize,
}

/// Fan-out channel for a single document room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,
    peers: RwLock<HashSet<ConnectionId>>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: RwLock::new(HashSet::new()),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Register `peer` and hand back its receiver.
    pub async fn add_peer(&self, peer: ConnectionId) -> FrameReceiver {
        self.peers.write().await.insert(peer);
        self.sender.subscribe()
    }

    /// Returns whether `peer` was registered.
    pub async fn remove_peer(&self, peer: &ConnectionId) -> bool {
        self.peers.write().await.remove(peer)
    }

    /// Encode `msg` once and send it to every receiver.
    ///
    /// Returns the number of receivers reached.
    pub fn broadcast(&self, msg: &ServerMessage) -> Result<usize, ProtocolError> {
        let frame: Frame = Arc::from(msg.encode()?);
        Ok(self.broadcast_frame(frame))
    }

    /// Send an already encoded frame.
    pub fn broadcast_frame(&self, frame: Frame) -> usize {
        let len = frame.len() as u64;
        let count = self.sender.send(frame).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len * count as u64, Ordering::Relaxed);
        count
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer: &ConnectionId) -> bool {
        self.peers.read().await.contains(peer)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }
}

/// Maps document ids to their rooms.
pub struct RoomManager {
    rooms: RwLock<HashMap<Uuid, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Register `peer` in the room of `document_id`, creating the room if needed.
    ///
    /// The map stays write-locked until the peer is registered, so a
    /// concurrent [`RoomManager::leave`] cannot drop the room in between.
    pub async fn join(&self, document_id: Uuid, peer: ConnectionId) -> FrameReceiver {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(document_id)
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)));
        room.add_peer(peer).await
    }

    /// Unregister `peer`, dropping the room once nobody is left in it.
    ///
    /// Returns whether `peer` was registered.
    pub async fn leave(&self, document_id: &Uuid, peer: &ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(document_id).cloned() else {
            return false;
        };
        let removed = room.remove_peer(peer).await;
        if room.peer_count().await == 0 {
            rooms.remove(document_id);
            let stats = room.stats().await;
            log::debug!(
                "Room {document_id} closed after {} frames ({} bytes)",
                stats.frames_sent,
                stats.bytes_sent
            );
        }
        removed
    }

    /// Whether `peer` currently holds a live subscription to `document_id`.
    pub async fn is_live(&self, document_id: &Uuid, peer: &ConnectionId) -> bool {
        match self.get(document_id).await {
            Some(room) => room.has_peer(peer).await,
            None => false,
        }
    }

    pub async fn get(&self, document_id: &Uuid) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(document_id).cloned()
    }

    /// Send `msg` to the room of `document_id`; an absent room reaches nobody.
    pub async fn broadcast(
        &self,
        document_id: &Uuid,
        msg: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        match self.get(document_id).await {
            Some(room) => room.broadcast(msg),
            None => Ok(0),
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
