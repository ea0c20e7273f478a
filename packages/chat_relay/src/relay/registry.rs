//! Connection Registry
//!
//! Tracks every live connection and the room (user identity) it belongs to.
//! Rooms are keyed by user id; a user may have many connections (tabs, devices)
//! but a connection is in at most one room.
//!
//! Both maps are sharded. Any operation touching both locks `connections`
//! before `rooms`.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;

use super::protocol::ServerEvent;

/// Outbound handle of one connection, drained by its writer task.
pub type ConnectionSender = mpsc::Sender<ServerEvent>;

/// Transport-level identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    /// The connection was in another room and has been moved.
    Moved { from: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub user_id: String,
    /// No live connection remains for `user_id`.
    pub room_empty: bool,
}

struct ConnectionEntry {
    sender: ConnectionSender,
    room: Option<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<String, HashMap<ConnectionId, ConnectionSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection. It belongs to no room yet.
    pub fn register(&self, conn_id: ConnectionId, sender: ConnectionSender) {
        self.connections.insert(conn_id, ConnectionEntry { sender, room: None });
    }

    /// Enrol a connection into room `user_id`.
    pub fn join(&self, conn_id: ConnectionId, user_id: &str) -> Result<JoinOutcome, RelayError> {
        let mut entry = self
            .connections
            .get_mut(&conn_id)
            .ok_or(RelayError::UnknownConnection(conn_id))?;

        if entry.room.as_deref() == Some(user_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let previous = entry.room.replace(user_id.to_string());
        if let Some(ref from) = previous {
            self.remove_from_room(from, conn_id);
        }
        self.rooms
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, entry.sender.clone());

        Ok(match previous {
            Some(from) => JoinOutcome::Moved { from },
            None => JoinOutcome::Joined,
        })
    }

    /// Forget a connection. Returns `None` if it was unknown or never joined.
    pub fn leave(&self, conn_id: ConnectionId) -> Option<LeaveOutcome> {
        let (_, entry) = self.connections.remove(&conn_id)?;
        let user_id = entry.room?;
        let room_empty = self.remove_from_room(&user_id, conn_id);
        debug!(conn_id = %conn_id, room = %user_id, room_empty, "Connection left room");
        Some(LeaveOutcome {
            user_id,
            room_empty,
        })
    }

    /// Remove `conn_id` from `room`, dropping the room once empty. Returns
    /// whether the room is now empty.
    fn remove_from_room(&self, room: &str, conn_id: ConnectionId) -> bool {
        let emptied = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&conn_id);
                members.is_empty()
            }
            None => return true,
        };
        if !emptied {
            return false;
        }
        // The shard guard is released above: a concurrent join may have
        // refilled the room, in which case it stays and is not empty.
        self.rooms
            .remove_if(room, |_, members| members.is_empty())
            .is_some()
            || !self.rooms.contains_key(room)
    }

    /// Snapshot of the outbound handles currently in `user_id`'s room.
    pub fn senders(&self, user_id: &str) -> Vec<(ConnectionId, ConnectionSender)> {
        self.rooms
            .get(user_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn room_of(&self, conn_id: ConnectionId) -> Option<String> {
        self.connections
            .get(&conn_id)
            .and_then(|entry| entry.room.clone())
    }

    pub fn is_member(&self, conn_id: ConnectionId, user_id: &str) -> bool {
        self.rooms
            .get(user_id)
            .is_some_and(|members| members.contains_key(&conn_id))
    }

    pub fn room_size(&self, user_id: &str) -> usize {
        self.rooms.get(user_id).map_or(0, |members| members.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Drop every room and outbound handle. Writers see their channel close.
    pub fn shutdown(&self) {
        self.rooms.clear();
        self.connections.clear();
    }
}
