//! Generation-tagged timer scheduling.
//!
//! Every background tick is tagged with the generation it was spawned
//! under. A room bumps its relevant generation counter on every phase
//! transition or cancellation; a tick whose generation has gone stale by
//! the time it fires is expected to no-op rather than panic or retry.

use std::sync::Arc;
use std::time::Duration;

use super::model::Room;

/// Repeats `on_tick` once per `period` until it returns `false`, then stops.
/// A snapshot broadcast follows every tick, so connected clients see each
/// intermediate state rather than just the end result.
pub(crate) fn spawn_interval_until<F>(room: Arc<Room>, period: Duration, mut on_tick: F)
where
    F: FnMut(&Arc<Room>) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let keep_going = on_tick(&room);
            room.broadcast_snapshot();
            if !keep_going {
                return;
            }
        }
    });
}

/// Fires `on_fire` exactly once after `delay`. Used for the per-turn timer
/// and the intermission countdown, both single-shot transitions.
pub(crate) fn spawn_after<F>(room: Arc<Room>, delay: Duration, on_fire: F)
where
    F: FnOnce(&Arc<Room>) + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        on_fire(&room);
        room.broadcast_snapshot();
    });
}
