//! A single WebSocket client: its outbound queue and the mutable identity
//! bindings (`userId`/`roomId`) a message handler fills in as it processes
//! `HELLO`/`ROOM_JOIN`.

use axum::extract::ws::Message;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::server::messages::OutMsg;

const LOG_TARGET: &str = "connection";

/// Outbound queue depth before a slow reader starts losing messages, using
/// a non-blocking-send-or-drop policy so one stalled client never
/// back-pressures the rest of a room.
pub const SEND_QUEUE_CAPACITY: usize = 64;

pub struct Connection {
    pub id: Uuid,
    outbound: mpsc::Sender<Message>,
    pub user_id: Mutex<Option<String>>,
    pub room_id: Mutex<Option<String>>,
}

impl Connection {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let conn = std::sync::Arc::new(Self {
            id: Uuid::new_v4(),
            outbound: tx,
            user_id: Mutex::new(None),
            room_id: Mutex::new(None),
        });
        (conn, rx)
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.lock().clone()
    }

    pub fn room_id(&self) -> Option<String> {
        self.room_id.lock().clone()
    }

    pub fn set_user_id(&self, user_id: String) {
        *self.user_id.lock() = Some(user_id);
    }

    pub fn set_room_id(&self, room_id: Option<String>) {
        *self.room_id.lock() = room_id;
    }

    /// Enqueues a text frame, dropping it silently if the client is too slow
    /// to keep up — a stalled client should never back-pressure a room.
    pub fn send(&self, out: &OutMsg) {
        self.send_value(out)
    }

    fn send_value(&self, value: &impl Serialize) {
        let text = match serde_json::to_string(value) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(target: LOG_TARGET, %err, "failed to serialize outbound message");
                return;
            }
        };
        if self.outbound.try_send(Message::Text(text)).is_err() {
            tracing::debug!(target: LOG_TARGET, conn_id = %self.id, "outbound queue full, dropping message");
        }
    }
}
