//! The room state machine: data model, message-driven actions, and the
//! generation-tagged timers that drive unattended phase transitions.

mod actions;
pub mod model;
mod timers;

pub use model::{
    GameMode, PenaltyMode, Player, Room, RoomConfig, RoomPublic, RoomSnapshot, RoomState,
    TurnPhase,
};
