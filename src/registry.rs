//! Lobby-wide bookkeeping: rooms by id, the one-active-room-per-user
//! reservation, and the set of connections subscribed to the lobby feed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::Timing;
use crate::connection::Connection;
use crate::room::model::{Room, RoomConfig};
use crate::server::error::RoomError;
use crate::server::messages::OutMsg;

const LOG_TARGET: &str = "registry";

struct RegistryInner {
    rooms: HashMap<String, Arc<Room>>,
    user_room: HashMap<String, String>,
    lobby_conns: HashMap<Uuid, Arc<Connection>>,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
    timing: Timing,
}

impl Registry {
    pub fn new(timing: Timing) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(RegistryInner {
                rooms: HashMap::new(),
                user_room: HashMap::new(),
                lobby_conns: HashMap::new(),
            }),
            timing,
        })
    }

    pub fn join_lobby(self: &Arc<Self>, conn: Arc<Connection>) {
        self.inner.lock().lobby_conns.insert(conn.id, conn);
    }

    pub fn leave_lobby(self: &Arc<Self>, conn: &Connection) {
        self.inner.lock().lobby_conns.remove(&conn.id);
    }

    /// `userId` may hold at most one room reservation at a time; rejoining
    /// the same room is always allowed (reconnect).
    pub fn reserve_user_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        if user_id.is_empty() || room_id.is_empty() {
            return Err(RoomError::MissingIdentity);
        }
        let mut inner = self.inner.lock();
        if let Some(cur) = inner.user_room.get(user_id) {
            if cur != room_id {
                return Err(RoomError::AlreadyInRoom(cur.clone()));
            }
            return Ok(());
        }
        inner.user_room.insert(user_id.to_string(), room_id.to_string());
        Ok(())
    }

    pub fn release_user_room(&self, user_id: &str, room_id: &str) {
        if user_id.is_empty() || room_id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.user_room.get(user_id).map(String::as_str) == Some(room_id) {
            inner.user_room.remove(user_id);
        }
    }

    pub fn create_room(
        self: &Arc<Self>,
        owner_user_id: &str,
        config: RoomConfig,
    ) -> Result<Arc<Room>, RoomError> {
        if owner_user_id.is_empty() {
            return Err(RoomError::MissingIdentity);
        }

        let room_id = crate::rng::generate_room_id();
        let mut inner = self.inner.lock();

        if let Some(cur) = inner.user_room.get(owner_user_id) {
            if cur != &room_id {
                return Err(RoomError::AlreadyInRoom(cur.clone()));
            }
        }
        inner
            .user_room
            .insert(owner_user_id.to_string(), room_id.clone());

        let room = Room::new(
            room_id.clone(),
            owner_user_id.to_string(),
            config,
            self.timing,
            Arc::downgrade(self),
        );
        inner.rooms.insert(room_id, room.clone());
        Ok(room)
    }

    pub fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.inner.lock().rooms.get(room_id).cloned()
    }

    pub fn list_rooms_public(&self) -> Vec<crate::room::model::RoomPublic> {
        let rooms: Vec<Arc<Room>> = self.inner.lock().rooms.values().cloned().collect();
        rooms.iter().map(|r| r.to_public()).collect()
    }

    /// Sends every lobby-subscribed connection the current room list.
    pub fn broadcast_rooms_list(&self) {
        let list = self.list_rooms_public();
        let conns: Vec<Arc<Connection>> = self.inner.lock().lobby_conns.values().cloned().collect();
        let out = OutMsg::new("ROOMS_LIST", None, serde_json::json!({ "rooms": list }));
        tracing::debug!(target: LOG_TARGET, count = conns.len(), "broadcasting room list");
        for conn in conns {
            conn.send(&out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> Timing {
        Timing::default()
    }

    #[test]
    fn reserve_user_room_allows_same_room_reconnect() {
        let registry = Registry::new(timing());
        registry.reserve_user_room("alice", "ROOM1").unwrap();
        assert!(registry.reserve_user_room("alice", "ROOM1").is_ok());
    }

    #[test]
    fn reserve_user_room_rejects_second_room() {
        let registry = Registry::new(timing());
        registry.reserve_user_room("alice", "ROOM1").unwrap();
        let err = registry.reserve_user_room("alice", "ROOM2").unwrap_err();
        assert!(matches!(err, RoomError::AlreadyInRoom(room) if room == "ROOM1"));
    }

    #[test]
    fn release_user_room_frees_up_a_new_reservation() {
        let registry = Registry::new(timing());
        registry.reserve_user_room("alice", "ROOM1").unwrap();
        registry.release_user_room("alice", "ROOM1");
        assert!(registry.reserve_user_room("alice", "ROOM2").is_ok());
    }

    #[test]
    fn create_room_then_get_room_round_trips() {
        let registry = Registry::new(timing());
        let room = registry.create_room("alice", RoomConfig::default()).unwrap();
        let fetched = registry.get_room(&room.id).unwrap();
        assert_eq!(fetched.id, room.id);
    }
}
