//! Room-based broadcaster
//!
//! A room is a derived string key over presentation id, role and optionally
//! slide index; it exists implicitly while at least one connection is
//! subscribed. Fan-out goes over each connection's outbound channel; the
//! member list is snapshotted before sending so no lock is held across a
//! channel send.

use dashmap::DashMap;
use metrics::counter;
use std::collections::{HashMap, HashSet};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Which broadcast group within a presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    /// Everyone in the presentation
    Presentation,
    /// Presenter connections only (co-presenters, other tabs)
    Presenter,
    /// Connections viewing one specific slide
    Slide(u32),
}

/// Derive the room name for a presentation
///
/// Pure and deterministic: independent instances produce identical keys.
pub fn room_for(kind: RoomKind, presentation_id: &str) -> String {
    match kind {
        RoomKind::Presentation => format!("presentation:{}", presentation_id),
        RoomKind::Presenter => format!("presentation:{}:presenter", presentation_id),
        RoomKind::Slide(index) => format!("presentation:{}:slide:{}", presentation_id, index),
    }
}

pub struct RoomBroadcaster {
    /// room name -> member connections, plus the reverse index for leave_all
    membership: RwLock<Membership>,
    /// connection -> outbound channel
    senders: DashMap<Uuid, mpsc::Sender<ServerMessage>>,
}

#[derive(Default)]
struct Membership {
    members: HashMap<String, HashSet<Uuid>>,
    rooms_of: HashMap<Uuid, HashSet<String>>,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self {
            membership: RwLock::new(Membership::default()),
            senders: DashMap::new(),
        }
    }

    /// Attach a connection's outbound channel
    pub fn register_connection(&self, connection_id: Uuid, sender: mpsc::Sender<ServerMessage>) {
        self.senders.insert(connection_id, sender);
    }

    /// Drop a connection's channel and its room memberships
    pub async fn unregister_connection(&self, connection_id: Uuid) {
        self.senders.remove(&connection_id);
        self.leave_all(connection_id).await;
    }

    pub async fn join(&self, connection_id: Uuid, room: &str) {
        let mut membership = self.membership.write().await;
        membership
            .members
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
        membership
            .rooms_of
            .entry(connection_id)
            .or_default()
            .insert(room.to_string());
        debug!("Connection {} joined room {}", connection_id, room);
    }

    pub async fn leave(&self, connection_id: Uuid, room: &str) {
        let mut membership = self.membership.write().await;
        if let Some(members) = membership.members.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                membership.members.remove(room);
            }
        }
        if let Some(rooms) = membership.rooms_of.get_mut(&connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                membership.rooms_of.remove(&connection_id);
            }
        }
    }

    pub async fn leave_all(&self, connection_id: Uuid) {
        let mut membership = self.membership.write().await;
        if let Some(rooms) = membership.rooms_of.remove(&connection_id) {
            for room in rooms {
                if let Some(members) = membership.members.get_mut(&room) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        membership.members.remove(&room);
                    }
                }
            }
        }
    }

    /// Move a session's room memberships from one connection to another
    ///
    /// Used on resume: the old connection stops receiving, the new one takes
    /// its place in every room the old one was in.
    pub async fn rebind(&self, old_connection_id: Uuid, new_connection_id: Uuid) {
        if old_connection_id == new_connection_id {
            return;
        }
        let rooms: Vec<String> = {
            let membership = self.membership.read().await;
            membership
                .rooms_of
                .get(&old_connection_id)
                .map(|rooms| rooms.iter().cloned().collect())
                .unwrap_or_default()
        };
        self.leave_all(old_connection_id).await;
        for room in rooms {
            self.join(new_connection_id, &room).await;
        }
    }

    /// Deliver a message to every connection in a room
    ///
    /// Zero members is success. Returns the number of connections the
    /// message was handed to; receivers that are gone or backed up are
    /// skipped.
    pub async fn broadcast(&self, room: &str, message: ServerMessage) -> usize {
        let members: Vec<Uuid> = {
            let membership = self.membership.read().await;
            membership
                .members
                .get(room)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for connection_id in members {
            let Some(sender) = self.senders.get(&connection_id) else {
                continue;
            };
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Dropping {} for backed-up connection {}",
                        message.message_type(),
                        connection_id
                    );
                    counter!("slidecast_broadcast_dropped_total").increment(1);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        counter!("slidecast_broadcasts_total", "message" => message.message_type())
            .increment(1);
        delivered
    }

    pub async fn count_in(&self, room: &str) -> usize {
        let membership = self.membership.read().await;
        membership.members.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of registered connections (for the metrics gauge)
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
