//! Domain rejections returned by room actions. The message text here goes
//! straight onto the wire inside an `ERROR` frame; the frame's `code` is
//! chosen per call site in `server::ws`, not derived from the variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("userID/roomID required")]
    MissingIdentity,
    #[error("user already in room {0}")]
    AlreadyInRoom(String),
    #[error("room is full")]
    RoomFull,
    #[error("room not found")]
    RoomNotFound,
    #[error("not in DICE state")]
    NotInDiceState,
    #[error("only dealer can stop dice")]
    NotDealer,
    #[error("game not started")]
    GameNotStarted,
    #[error("not in WAIT_DRAW phase")]
    NotWaitDraw,
    #[error("not in WAIT_DISCARD phase")]
    NotWaitDiscard,
    #[error("user not in room")]
    UserNotInRoom,
    #[error("not your turn")]
    NotYourTurn,
    #[error("tileId required")]
    TileIdRequired,
    #[error("tile not in hand")]
    TileNotInHand,
    #[error("invalid gameMode")]
    InvalidGameMode,
    #[error("invalid penaltyMode")]
    InvalidPenaltyMode,
    #[error("handCount must be 1..11")]
    InvalidHandCount,
    #[error("user mismatch")]
    UserMismatch,
    #[error("user not seated")]
    NotSeated,
}
