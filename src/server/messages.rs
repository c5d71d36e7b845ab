//! Wire message envelopes and per-type payloads for the `/ws` protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct InMsg {
    pub t: String,
    #[serde(rename = "reqId", default)]
    pub req_id: Option<String>,
    #[serde(default)]
    pub p: Value,
}

#[derive(Debug, Serialize)]
pub struct OutMsg {
    pub t: String,
    #[serde(rename = "reqId", skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<Value>,
}

impl OutMsg {
    pub fn new(t: impl Into<String>, req_id: Option<String>, payload: impl Serialize) -> Self {
        Self {
            t: t.into(),
            req_id,
            p: serde_json::to_value(payload).ok(),
        }
    }

    pub fn bare(t: impl Into<String>) -> Self {
        Self {
            t: t.into(),
            req_id: None,
            p: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrPayload {
    pub code: &'static str,
    pub msg: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct HelloPayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RoomCreatePayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub config: Option<RoomConfigInput>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RoomConfigInput {
    #[serde(rename = "gameMode", default)]
    pub game_mode: Option<String>,
    #[serde(rename = "penaltyMode", default)]
    pub penalty_mode: Option<String>,
    #[serde(rename = "handCount", default)]
    pub hand_count: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RoomJoinPayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DiceStopPayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DrawPayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DiscardPayload {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(rename = "tileId", default)]
    pub tile_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct MeldSuggestPayload {
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub mode: String,
}
