//! Room data model: the state machine's fields, the per-seat redacted
//! snapshot, and the lobby-facing public projection.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Timing;
use crate::connection::Connection;
use crate::registry::Registry;
use crate::server::error::RoomError;
use crate::server::messages::RoomConfigInput;
use crate::solver::SolveResult;

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn next_seat(seat: u8) -> u8 {
    if seat >= 4 {
        1
    } else {
        seat + 1
    }
}

/// Wraps a 1-indexed pile id into the `1..=15` range.
pub fn wrap_pile(p: i32) -> u8 {
    let mut p = p;
    while p > 15 {
        p -= 15;
    }
    while p < 1 {
        p += 15;
    }
    p as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    Lobby,
    AutoStart,
    BuildPiles,
    Dice,
    Dealing,
    Playing,
    Intermission,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    WaitDraw,
    WaitDiscard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    #[serde(rename = "CLASSIC_101")]
    Classic101,
    #[serde(rename = "KATLAMALI_101")]
    Katlamali101,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyMode {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub game_mode: GameMode,
    pub penalty_mode: PenaltyMode,
    pub hand_count: i32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            game_mode: GameMode::Classic101,
            penalty_mode: PenaltyMode::On,
            hand_count: 1,
        }
    }
}

impl RoomConfig {
    /// Applies a client-supplied override onto the default config, matching
    /// `normalizeConfig`'s field-by-field validation.
    pub fn normalize(input: Option<&RoomConfigInput>) -> Result<Self, RoomError> {
        let mut cfg = Self::default();
        let Some(input) = input else {
            return Ok(cfg);
        };

        if let Some(gm) = input.game_mode.as_deref().filter(|s| !s.is_empty()) {
            cfg.game_mode = match gm {
                "CLASSIC_101" => GameMode::Classic101,
                "KATLAMALI_101" => GameMode::Katlamali101,
                _ => return Err(RoomError::InvalidGameMode),
            };
        }
        if let Some(pm) = input.penalty_mode.as_deref().filter(|s| !s.is_empty()) {
            cfg.penalty_mode = match pm {
                "ON" => PenaltyMode::On,
                "OFF" => PenaltyMode::Off,
                _ => return Err(RoomError::InvalidPenaltyMode),
            };
        }
        if let Some(hc) = input.hand_count.filter(|&hc| hc != 0) {
            if !(1..=11).contains(&hc) {
                return Err(RoomError::InvalidHandCount);
            }
            cfg.hand_count = hc;
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub user_id: String,
    pub seat: u8,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardEvent {
    pub tile_id: String,
    pub seat: u8,
    pub user_id: String,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub state: RoomState,
    pub owner_id: String,
    pub updated_at: i64,
    pub players: HashMap<u8, Player>,

    pub config: RoomConfig,
    pub config_locked: bool,
    pub dealer_seat: u8,
    pub intermission_until: i64,
    pub hand_index: i32,

    pub auto_start_left: i32,
    pub build_pile_idx: i32,

    pub dice_left: i32,
    pub dice_value: u8,

    pub start_pile: u8,
    pub indicator_pile: u8,
    pub indicator: String,
    pub okey: String,

    pub pile_owners: HashMap<u8, u8>,
    pub pile_counts: HashMap<u8, usize>,
    pub draw_pile_ids: Vec<u8>,

    pub deal_left: i32,
    pub deal_cursor: u8,
    pub deal_seat_cursor: u8,

    pub turn_seat: u8,
    pub turn_phase: Option<TurnPhase>,
    pub turn_deadline: i64,

    pub draw_count: usize,
    pub discards: Vec<DiscardEvent>,
    pub hand_counts: HashMap<u8, usize>,
    pub my_hand: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPublic {
    pub room_id: String,
    pub state: RoomState,
    pub owner_id: String,
    pub updated_at: i64,
    pub players: HashMap<u8, Player>,
    pub config: RoomConfig,
    pub config_locked: bool,
    pub dealer_seat: u8,
    pub turn_seat: u8,
    pub turn_phase: Option<TurnPhase>,
    pub turn_deadline: i64,
}

/// Mutable room fields, guarded by `Room::inner`. Nothing async ever
/// executes while this lock is held.
pub(crate) struct RoomInner {
    pub state: RoomState,
    pub players: HashMap<u8, Player>,
    pub owner_id: String,
    pub updated_at: i64,
    pub config: RoomConfig,
    pub config_locked: bool,
    pub dealer_seat: u8,
    pub hand_index: i32,

    /// Bumped on every phase transition; background tick loops started
    /// under a stale generation exit instead of acting.
    pub timer_generation: u64,
    /// Bumped on every turn-timer reset, independent of `timer_generation`
    /// so a draw/discard mid-turn doesn't require retiring the whole phase.
    pub turn_timer_generation: u64,

    pub intermission_until: i64,
    pub solver_cache: HashMap<String, SolveResult>,

    pub auto_start_left: i32,

    pub build_pile_idx: i32,
    pub piles: HashMap<u8, Vec<String>>,

    pub dice_left: i32,
    pub dice_value: u8,
    pub dice_stop_by: Option<String>,

    pub start_pile: u8,
    pub indicator_pile: u8,
    pub indicator: String,
    pub okey_tile_id: String,

    pub pile_owners: HashMap<u8, u8>,
    pub pile_counts: HashMap<u8, usize>,
    pub draw_pile_ids: Vec<u8>,

    pub deal_left: i32,
    pub deal_cursor: u8,
    pub deal_seat_cursor: u8,

    pub turn_seat: u8,
    pub turn_phase: Option<TurnPhase>,
    pub turn_deadline: i64,

    pub draw_pile: Vec<String>,
    pub discards: Vec<DiscardEvent>,
    pub hands: HashMap<u8, Vec<String>>,
}

impl RoomInner {
    fn new(owner_id: String, config: RoomConfig) -> Self {
        Self {
            state: RoomState::Lobby,
            players: HashMap::new(),
            owner_id,
            updated_at: unix_now(),
            config,
            config_locked: false,
            dealer_seat: 1,
            hand_index: 0,
            timer_generation: 0,
            turn_timer_generation: 0,
            intermission_until: 0,
            solver_cache: HashMap::new(),
            auto_start_left: 0,
            build_pile_idx: 0,
            piles: HashMap::new(),
            dice_left: 0,
            dice_value: 0,
            dice_stop_by: None,
            start_pile: 0,
            indicator_pile: 0,
            indicator: String::new(),
            okey_tile_id: String::new(),
            pile_owners: HashMap::new(),
            pile_counts: HashMap::new(),
            draw_pile_ids: Vec::new(),
            deal_left: 0,
            deal_cursor: 0,
            deal_seat_cursor: 0,
            turn_seat: 0,
            turn_phase: None,
            turn_deadline: 0,
            draw_pile: Vec::new(),
            discards: Vec::new(),
            hands: HashMap::new(),
        }
    }
}

pub struct Room {
    pub id: String,
    pub timing: Timing,
    pub(crate) registry: Weak<Registry>,
    pub(crate) inner: Mutex<RoomInner>,
    pub(crate) conns: Mutex<HashMap<String, Arc<Connection>>>,
}

impl Room {
    pub(crate) fn new(
        id: String,
        owner_id: String,
        config: RoomConfig,
        timing: Timing,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        let mut inner = RoomInner::new(owner_id.clone(), config);
        inner.players.insert(
            1,
            Player {
                user_id: owner_id,
                seat: 1,
                connected: false,
            },
        );
        Arc::new(Self {
            id,
            timing,
            registry,
            inner: Mutex::new(inner),
            conns: Mutex::new(HashMap::new()),
        })
    }

    pub fn seat_of(&self, user_id: &str) -> u8 {
        let inner = self.inner.lock();
        inner
            .players
            .iter()
            .find(|(_, p)| p.user_id == user_id)
            .map(|(&seat, _)| seat)
            .unwrap_or(0)
    }

    pub fn snapshot_for_user(&self, user_id: &str) -> RoomSnapshot {
        let inner = self.inner.lock();

        let user_seat = inner
            .players
            .iter()
            .find(|(_, p)| p.user_id == user_id)
            .map(|(&seat, _)| seat)
            .unwrap_or(0);

        let hand_counts = inner
            .players
            .keys()
            .map(|&seat| (seat, inner.hands.get(&seat).map(|h| h.len()).unwrap_or(0)))
            .collect();

        let my_hand = if user_seat != 0 {
            inner.hands.get(&user_seat).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        RoomSnapshot {
            room_id: self.id.clone(),
            state: inner.state,
            owner_id: inner.owner_id.clone(),
            updated_at: inner.updated_at,
            players: inner.players.clone(),
            config: inner.config,
            config_locked: inner.config_locked,
            dealer_seat: inner.dealer_seat,
            intermission_until: inner.intermission_until,
            hand_index: inner.hand_index,
            auto_start_left: inner.auto_start_left,
            build_pile_idx: inner.build_pile_idx,
            dice_left: inner.dice_left,
            dice_value: inner.dice_value,
            start_pile: inner.start_pile,
            indicator_pile: inner.indicator_pile,
            indicator: inner.indicator.clone(),
            okey: inner.okey_tile_id.clone(),
            pile_owners: inner.pile_owners.clone(),
            pile_counts: inner.pile_counts.clone(),
            draw_pile_ids: inner.draw_pile_ids.clone(),
            deal_left: inner.deal_left,
            deal_cursor: inner.deal_cursor,
            deal_seat_cursor: inner.deal_seat_cursor,
            turn_seat: inner.turn_seat,
            turn_phase: inner.turn_phase,
            turn_deadline: inner.turn_deadline,
            draw_count: inner.draw_pile.len(),
            discards: inner.discards.clone(),
            hand_counts,
            my_hand,
        }
    }

    pub fn to_public(&self) -> RoomPublic {
        let inner = self.inner.lock();
        RoomPublic {
            room_id: self.id.clone(),
            state: inner.state,
            owner_id: inner.owner_id.clone(),
            updated_at: inner.updated_at,
            players: inner.players.clone(),
            config: inner.config,
            config_locked: inner.config_locked,
            dealer_seat: inner.dealer_seat,
            turn_seat: inner.turn_seat,
            turn_phase: inner.turn_phase,
            turn_deadline: inner.turn_deadline,
        }
    }

    /// Sends every connected player their own redacted snapshot.
    pub fn broadcast_snapshot(&self) {
        let conns: Vec<Arc<Connection>> = self.conns.lock().values().cloned().collect();
        for conn in conns {
            let Some(user_id) = conn.user_id() else {
                continue;
            };
            let snapshot = self.snapshot_for_user(&user_id);
            conn.send(&crate::server::messages::OutMsg::new(
                "ROOM_SNAPSHOT",
                None,
                snapshot,
            ));
        }
    }

    pub fn attach_conn(&self, user_id: &str, conn: Arc<Connection>) {
        {
            let mut inner = self.inner.lock();
            if let Some(p) = inner.players.values_mut().find(|p| p.user_id == user_id) {
                p.connected = true;
            }
            inner.updated_at = unix_now();
        }
        self.conns.lock().insert(user_id.to_string(), conn);
    }

    pub fn detach_conn(&self, user_id: &str) {
        self.conns.lock().remove(user_id);
        let mut inner = self.inner.lock();
        if let Some(p) = inner.players.values_mut().find(|p| p.user_id == user_id) {
            p.connected = false;
        }
        inner.updated_at = unix_now();

        if matches!(inner.state, RoomState::AutoStart | RoomState::Lobby) && inner.players.len() != 4 {
            inner.timer_generation += 1;
            inner.auto_start_left = 0;
            inner.state = RoomState::Lobby;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_seat_wraps_four_to_one() {
        assert_eq!(next_seat(1), 2);
        assert_eq!(next_seat(3), 4);
        assert_eq!(next_seat(4), 1);
    }

    #[test]
    fn wrap_pile_wraps_both_directions() {
        assert_eq!(wrap_pile(16), 1);
        assert_eq!(wrap_pile(0), 15);
        assert_eq!(wrap_pile(-2), 13);
        assert_eq!(wrap_pile(7), 7);
    }

    #[test]
    fn room_config_defaults_when_no_input() {
        let cfg = RoomConfig::normalize(None).unwrap();
        assert_eq!(cfg.hand_count, 1);
        assert_eq!(cfg.game_mode, GameMode::Classic101);
        assert_eq!(cfg.penalty_mode, PenaltyMode::On);
    }

    #[test]
    fn room_config_rejects_invalid_hand_count() {
        let input = RoomConfigInput {
            game_mode: None,
            penalty_mode: None,
            hand_count: Some(20),
        };
        assert!(matches!(
            RoomConfig::normalize(Some(&input)),
            Err(RoomError::InvalidHandCount)
        ));
    }

    #[test]
    fn room_config_rejects_invalid_game_mode() {
        let input = RoomConfigInput {
            game_mode: Some("FREEFORM".to_string()),
            penalty_mode: None,
            hand_count: None,
        };
        assert!(matches!(
            RoomConfig::normalize(Some(&input)),
            Err(RoomError::InvalidGameMode)
        ));
    }

    #[test]
    fn new_room_seats_owner_at_one_disconnected() {
        let registry = Weak::new();
        let room = Room::new(
            "ROOM1".to_string(),
            "owner".to_string(),
            RoomConfig::default(),
            Timing::default(),
            registry,
        );
        assert_eq!(room.seat_of("owner"), 1);
        let snap = room.to_public();
        assert_eq!(snap.players.len(), 1);
        assert!(!snap.players[&1].connected);
    }
}
