//! The `/ws` connection lifecycle: the `HELLO`/`ROOM_CREATE`/`ROOM_JOIN`/
//! gameplay message switch, plus the 30s keepalive ping that detects dead
//! peers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::connection::Connection;
use crate::room::model::RoomConfig;
use crate::server::error::RoomError;
use crate::server::messages::*;

use super::routes::AppState;

const LOG_TARGET: &str = "server::ws";
const PING_INTERVAL: Duration = Duration::from_secs(30);

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound_rx) = Connection::new();

    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        ticker.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&state, &conn, &text).await,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    cleanup(&state, &conn);
    writer.abort();
}

fn cleanup(state: &AppState, conn: &Connection) {
    state.registry.leave_lobby(conn);
    let Some(room_id) = conn.room_id() else { return };
    let Some(user_id) = conn.user_id() else { return };
    if let Some(room) = state.registry.get_room(&room_id) {
        room.detach_conn(&user_id);
        room.broadcast_snapshot();
    }
    state.registry.release_user_room(&user_id, &room_id);
    state.registry.broadcast_rooms_list();
}

fn send_err(conn: &Connection, req_id: Option<String>, code: &'static str, msg: impl Into<String>) {
    let msg = msg.into();
    tracing::debug!(target: LOG_TARGET, code, %msg, "rejecting request");
    conn.send(&OutMsg::new("ERROR", req_id, ErrPayload { code, msg }));
}

async fn handle_text(state: &AppState, conn: &Arc<Connection>, text: &str) {
    let msg: InMsg = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            tracing::debug!(target: LOG_TARGET, %err, "malformed frame");
            send_err(conn, None, "BAD_JSON", "malformed message envelope");
            return;
        }
    };

    match msg.t.as_str() {
        "PING" => conn.send(&OutMsg::bare("PONG")),
        "HELLO" => handle_hello(state, conn, msg),
        "ROOM_CREATE" => handle_room_create(state, conn, msg),
        "ROOM_JOIN" => handle_room_join(state, conn, msg),
        "ROOMS_LIST_REQUEST" => state.registry.broadcast_rooms_list(),
        "DICE_STOP" => handle_dice_stop(state, conn, msg),
        "DRAW" => handle_draw(state, conn, msg),
        "DISCARD" => handle_discard(state, conn, msg),
        "MELD_SUGGEST" => handle_meld_suggest(state, conn, msg),
        other => {
            tracing::debug!(target: LOG_TARGET, t = other, "unknown message type");
            conn.send(&OutMsg::new(
                "ERROR",
                msg.req_id,
                ErrPayload {
                    code: "UNKNOWN_TYPE",
                    msg: format!("unknown message type {other}"),
                },
            ));
        }
    }
}

fn handle_hello(state: &AppState, conn: &Arc<Connection>, msg: InMsg) {
    let payload: HelloPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "userId required");
    }
    conn.set_user_id(payload.user_id.clone());
    state.registry.join_lobby(Arc::clone(conn));
    conn.send(&OutMsg::new(
        "HELLO_OK",
        msg.req_id,
        serde_json::json!({ "userId": payload.user_id }),
    ));
    state.registry.broadcast_rooms_list();
}

fn handle_room_create(state: &AppState, conn: &Arc<Connection>, msg: InMsg) {
    let payload: RoomCreatePayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "send HELLO first or include userId in payload");
    }

    let config = match RoomConfig::normalize(payload.config.as_ref()) {
        Ok(c) => c,
        Err(err) => return send_err(conn, msg.req_id, "BAD_CONFIG", err.to_string()),
    };

    let room = match state.registry.create_room(&payload.user_id, config) {
        Ok(r) => r,
        Err(err) => return send_err(conn, msg.req_id, "CREATE_FAILED", err.to_string()),
    };

    if let Err(err) = room.join(&payload.user_id) {
        return send_err(conn, msg.req_id, "CREATE_FAILED", err.to_string());
    }

    state.registry.leave_lobby(conn);
    conn.set_user_id(payload.user_id.clone());
    conn.set_room_id(Some(room.id.clone()));
    room.attach_conn(&payload.user_id, Arc::clone(conn));

    conn.send(&OutMsg::new(
        "ROOM_CREATED",
        msg.req_id,
        serde_json::json!({ "roomId": room.id }),
    ));
    room.broadcast_snapshot();
    state.registry.broadcast_rooms_list();
}

fn handle_room_join(state: &AppState, conn: &Arc<Connection>, msg: InMsg) {
    let payload: RoomJoinPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "send HELLO first or include userId");
    }
    if payload.room_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_ROOM", "roomId required");
    }

    let Some(room) = state.registry.get_room(&payload.room_id) else {
        return send_err(conn, msg.req_id, "ROOM_NOT_FOUND", "room not found");
    };

    if let Err(err) = state.registry.reserve_user_room(&payload.user_id, &room.id) {
        return send_err(conn, msg.req_id, "ALREADY_IN_ROOM", err.to_string());
    }
    if let Err(err) = room.join(&payload.user_id) {
        state.registry.release_user_room(&payload.user_id, &room.id);
        return send_err(conn, msg.req_id, "JOIN_FAILED", err.to_string());
    }

    state.registry.leave_lobby(conn);
    conn.set_user_id(payload.user_id.clone());
    conn.set_room_id(Some(room.id.clone()));
    room.attach_conn(&payload.user_id, Arc::clone(conn));

    conn.send(&OutMsg::new(
        "ROOM_JOINED",
        msg.req_id,
        serde_json::json!({ "roomId": room.id }),
    ));
    room.broadcast_snapshot();
    state.registry.broadcast_rooms_list();
}

fn handle_dice_stop(state: &AppState, conn: &Connection, msg: InMsg) {
    let payload: DiceStopPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "userId required");
    }
    if payload.room_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_ROOM", "roomId required");
    }
    let Some(room) = state.registry.get_room(&payload.room_id) else {
        return send_err(conn, msg.req_id, "ROOM_NOT_FOUND", "room not found");
    };
    match room.dice_stop(&payload.user_id) {
        Ok(()) => room.broadcast_snapshot(),
        Err(err) => send_err(conn, msg.req_id, "DICE_STOP_REJECTED", err.to_string()),
    }
}

fn handle_draw(state: &AppState, conn: &Connection, msg: InMsg) {
    let payload: DrawPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "userId required");
    }
    if payload.room_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_ROOM", "roomId required");
    }
    let Some(room) = state.registry.get_room(&payload.room_id) else {
        return send_err(conn, msg.req_id, "ROOM_NOT_FOUND", "room not found");
    };
    match room.draw(&payload.user_id) {
        Ok(()) => room.broadcast_snapshot(),
        Err(err) => send_err(conn, msg.req_id, "DRAW_REJECTED", err.to_string()),
    }
}

fn handle_discard(state: &AppState, conn: &Connection, msg: InMsg) {
    let payload: DiscardPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_USER", "userId required");
    }
    if payload.room_id.is_empty() {
        return send_err(conn, msg.req_id, "MISSING_ROOM", "roomId required");
    }
    let Some(room) = state.registry.get_room(&payload.room_id) else {
        return send_err(conn, msg.req_id, "ROOM_NOT_FOUND", "room not found");
    };
    match room.discard(&payload.user_id, &payload.tile_id) {
        Ok(()) => room.broadcast_snapshot(),
        Err(err) => send_err(conn, msg.req_id, "DISCARD_REJECTED", err.to_string()),
    }
}

fn handle_meld_suggest(state: &AppState, conn: &Connection, msg: InMsg) {
    let payload: MeldSuggestPayload = serde_json::from_value(msg.p).unwrap_or_default();
    if payload.room_id.is_empty() || payload.user_id.is_empty() {
        return send_err(conn, msg.req_id, "BAD_REQUEST", "roomId and userId required");
    }

    let Some(room) = state.registry.get_room(&payload.room_id) else {
        return send_err(conn, msg.req_id, "ROOM_NOT_FOUND", "room not found");
    };

    if conn.user_id().as_deref() != Some(payload.user_id.as_str()) {
        return send_err(conn, msg.req_id, "FORBIDDEN", RoomError::UserMismatch.to_string());
    }

    match room.meld_suggest(&payload.user_id, &payload.mode) {
        Ok((hand_hash, cached, result)) => {
            conn.send(&OutMsg::new(
                "MELD_SUGGESTED",
                msg.req_id,
                serde_json::json!({
                    "roomId": payload.room_id,
                    "userId": payload.user_id,
                    "handHash": hand_hash,
                    "cached": cached,
                    "result": result,
                }),
            ));
        }
        Err(err) => send_err(conn, msg.req_id, "NOT_IN_ROOM", err.to_string()),
    }
}
