//! Room membership, presence broadcasts, and the relay paths (CRDT updates,
//! cursors, chat).
//!
//! Broadcast is an explicit per-member push: every member owns an unbounded
//! outbound queue and a room event is pushed into each queue independently,
//! so one member's failure never blocks delivery to another. Per-sender
//! ordering holds because each sender's inbound loop pushes sequentially
//! into each receiver's FIFO queue.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::events::{CollabEvent, CursorPosition, SelectionRange, UserRef};

/// One connection present in a room.
pub struct RoomMember {
    pub conn_id: String,
    pub user_id: String,
    pub username: String,
    tx: mpsc::UnboundedSender<CollabEvent>,
}

impl RoomMember {
    pub fn new(
        conn_id: String,
        user_id: String,
        username: String,
        tx: mpsc::UnboundedSender<CollabEvent>,
    ) -> Self {
        Self {
            conn_id,
            user_id,
            username,
            tx,
        }
    }

    fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.user_id.clone(),
            username: self.username.clone(),
        }
    }
}

/// In-memory map of room id → present members. Rooms are created lazily on
/// first join and removed when the last member leaves.
pub struct RoomRegistry {
    rooms: DashMap<String, Mutex<Vec<RoomMember>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room, creating the room if absent, and
    /// broadcast the updated member list to every member including the
    /// joiner. Joining does not leave any room the connection already
    /// occupies (multi-room presence is allowed).
    ///
    /// A room never holds two entries for the same user id: re-joining
    /// (e.g. after a silent reconnect) replaces the stale entry.
    pub fn join(&self, room_id: &str, member: RoomMember) {
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut members = entry.lock();

        members.retain(|m| m.user_id != member.user_id);
        let user = member.user_ref();
        members.push(member);

        let users = member_list(&members);
        for m in members.iter() {
            let _ = m.tx.send(CollabEvent::UserJoined {
                user: user.clone(),
                users: users.clone(),
            });
        }
    }

    /// Remove a connection from a room. No-op if it was not a member.
    /// Broadcasts the updated member list to the remaining members and
    /// deletes the room if it is left empty.
    pub fn leave(&self, room_id: &str, conn_id: &str) {
        let mut emptied = false;

        if let Some(entry) = self.rooms.get(room_id) {
            let mut members = entry.lock();
            let Some(pos) = members.iter().position(|m| m.conn_id == conn_id) else {
                return;
            };
            let removed = members.remove(pos);

            if members.is_empty() {
                emptied = true;
            } else {
                let user = removed.user_ref();
                let users = member_list(&members);
                for m in members.iter() {
                    let _ = m.tx.send(CollabEvent::UserLeft {
                        user: user.clone(),
                        users: users.clone(),
                    });
                }
            }
        } else {
            return;
        }

        if emptied {
            // Guard against a join racing in between the unlock and removal.
            self.rooms
                .remove_if(room_id, |_, members| members.lock().is_empty());
            tracing::debug!(%room_id, "room emptied and removed");
        }
    }

    /// Remove a connection from every room it occupies, with the same
    /// broadcast/deletion semantics as `leave`. Invoked exactly once when a
    /// connection closes for any reason.
    pub fn disconnect_cleanup(&self, conn_id: &str) {
        let room_ids: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock()
                    .iter()
                    .any(|m| m.conn_id == conn_id)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for room_id in room_ids {
            self.leave(&room_id, conn_id);
        }
    }

    /// Forward an opaque CRDT update to every *other* member of the room.
    /// The fragment is never interpreted. If the room no longer exists the
    /// fragment is silently dropped — the condition is unobservable to the
    /// sender.
    pub fn relay_text_change(
        &self,
        room_id: &str,
        sender_conn: &str,
        sender: UserRef,
        changes: Vec<Value>,
        version_id: Option<Value>,
    ) {
        let Some(entry) = self.rooms.get(room_id) else {
            tracing::trace!(%room_id, "text-change for absent room dropped");
            return;
        };
        let members = entry.lock();
        for m in members.iter().filter(|m| m.conn_id != sender_conn) {
            let _ = m.tx.send(CollabEvent::TextChanged {
                user_id: sender.id.clone(),
                username: sender.username.clone(),
                changes: changes.clone(),
                version_id: version_id.clone(),
            });
        }
    }

    /// Relay the sender's latest cursor state to every other member.
    /// Fire-and-forget; a sender that is not a member of the room is a
    /// silent no-op.
    pub fn broadcast_cursor(
        &self,
        room_id: &str,
        sender_conn: &str,
        sender: UserRef,
        position: CursorPosition,
        selection: Option<SelectionRange>,
    ) {
        let Some(entry) = self.rooms.get(room_id) else {
            return;
        };
        let members = entry.lock();
        if !members.iter().any(|m| m.conn_id == sender_conn) {
            return;
        }
        for m in members.iter().filter(|m| m.conn_id != sender_conn) {
            let _ = m.tx.send(CollabEvent::CursorMoved {
                user_id: sender.id.clone(),
                username: sender.username.clone(),
                position,
                selection,
            });
        }
    }

    /// Broadcast a chat message to every member of the room, the sender
    /// included. The text is trimmed; an empty message is dropped. No
    /// persistence, no delivery guarantee to members mid-reconnect.
    pub fn send_chat(&self, room_id: &str, id: String, sender: UserRef, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let Some(entry) = self.rooms.get(room_id) else {
            return;
        };
        let timestamp = Utc::now();
        let members = entry.lock();
        for m in members.iter() {
            let _ = m.tx.send(CollabEvent::Chat {
                id: id.clone(),
                user_id: sender.id.clone(),
                username: sender.username.clone(),
                message: message.to_string(),
                timestamp,
            });
        }
    }

    /// Current member list of a room, or `None` if the room does not exist.
    pub fn members(&self, room_id: &str) -> Option<Vec<UserRef>> {
        self.rooms
            .get(room_id)
            .map(|entry| member_list(&entry.lock()))
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn member_list(members: &[RoomMember]) -> Vec<UserRef> {
    members.iter().map(RoomMember::user_ref).collect()
}
