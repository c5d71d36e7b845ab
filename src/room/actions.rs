//! Room actions: the message-driven transitions a connection can trigger,
//! and the phase-driver functions the timer loops hand control back to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::server::error::RoomError;
use crate::solver::{self, SolveMode, SolveResult};

use super::model::{
    next_seat, unix_now, wrap_pile, DiscardEvent, Player, Room, RoomInner, RoomState, TurnPhase,
};
use super::timers;

const LOG_TARGET: &str = "room";

/// Content-addresses a hand for the solver cache key. Cryptographic
/// strength isn't needed here, `sha2` is used only because it is already
/// on the dependency tree for other purposes.
fn hand_hash(hand: &[String]) -> String {
    let mut sorted: Vec<&str> = hand.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(sorted.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Picks the tile a timed-out player auto-discards: lowest rank first,
/// jokers last, ties broken by the raw byte order of the color letter
/// (`B < G < K < R`). This is a distinct ordering from the solver's own
/// `unusedTiles` sort, which ranks colors `R < B < G < K` instead — both
/// orderings are load-bearing as written and must not be unified.
fn pick_auto_discard_index(hand: &[String]) -> usize {
    fn sort_key(tile: &str) -> (bool, u8, i16) {
        if tile.starts_with("JOKER") {
            return (true, 0, i16::MAX);
        }
        let bytes = tile.as_bytes();
        if bytes.len() < 3 {
            return (false, 0, 0);
        }
        let color = bytes[0];
        let rank: i16 = tile.get(1..3).and_then(|s| s.parse().ok()).unwrap_or(0);
        (false, color, rank)
    }

    let mut best = 0usize;
    let mut best_key = sort_key(&hand[0]);
    for (i, tile) in hand.iter().enumerate().skip(1) {
        let key = sort_key(tile);
        let (joker, color, rank) = key;
        let (best_joker, best_color, best_rank) = best_key;
        let better = if best_joker && !joker {
            true
        } else if joker && !best_joker {
            false
        } else if rank != best_rank {
            rank < best_rank
        } else {
            color < best_color
        };
        if better {
            best = i;
            best_key = key;
        }
    }
    best
}

fn recalc_pile_owners(inner: &mut RoomInner) {
    let s1 = inner.dealer_seat;
    let s2 = next_seat(s1);
    let s3 = next_seat(s2);
    let s4 = next_seat(s3);
    for pile in 1..=15u8 {
        let owner = match pile {
            1..=4 => s1,
            5..=8 => s2,
            9..=12 => s3,
            _ => s4,
        };
        inner.pile_owners.insert(pile, owner);
    }
}

impl Room {
    /// Seats `user_id`, or reconnects them to their existing seat. Kicks
    /// off the auto-start countdown once all four seats are filled.
    pub fn join(self: &Arc<Self>, user_id: &str) -> Result<u8, RoomError> {
        let assigned_seat = {
            let mut inner = self.inner.lock();
            let existing = inner
                .players
                .iter()
                .find(|(_, p)| p.user_id == user_id)
                .map(|(&seat, _)| seat);

            let seat = if let Some(seat) = existing {
                if let Some(p) = inner.players.get_mut(&seat) {
                    p.connected = true;
                }
                Some(seat)
            } else {
                let mut found = None;
                for seat in 1..=4u8 {
                    if !inner.players.contains_key(&seat) {
                        inner.players.insert(
                            seat,
                            Player {
                                user_id: user_id.to_string(),
                                seat,
                                connected: true,
                            },
                        );
                        found = Some(seat);
                        break;
                    }
                }
                found
            };
            inner.updated_at = unix_now();
            seat
        };

        match assigned_seat {
            Some(seat) => {
                self.try_auto_start();
                Ok(seat)
            }
            None => Err(RoomError::RoomFull),
        }
    }

    fn try_auto_start(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, RoomState::Lobby | RoomState::AutoStart) {
            return;
        }
        if inner.players.len() != 4 {
            return;
        }
        if inner.state == RoomState::AutoStart {
            return;
        }

        inner.state = RoomState::AutoStart;
        inner.auto_start_left = self.timing.auto_start.as_secs() as i32;
        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        inner.updated_at = unix_now();
        drop(inner);

        tracing::info!(target: LOG_TARGET, room = %self.id, "auto-start countdown begins");
        timers::spawn_interval_until(Arc::clone(self), Duration::from_secs(1), move |room| {
            room.on_auto_start_tick(generation)
        });
    }

    fn on_auto_start_tick(self: &Arc<Self>, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.timer_generation != generation {
            return false;
        }
        if inner.players.len() != 4 || inner.state != RoomState::AutoStart {
            inner.timer_generation += 1;
            inner.state = RoomState::Lobby;
            inner.auto_start_left = 0;
            inner.updated_at = unix_now();
            return false;
        }

        if inner.auto_start_left > 0 {
            inner.auto_start_left -= 1;
        }
        inner.updated_at = unix_now();

        if inner.auto_start_left <= 0 {
            self.start_build_piles_locked(&mut inner);
            return false;
        }
        true
    }

    fn start_build_piles_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        inner.state = RoomState::BuildPiles;
        inner.build_pile_idx = 0;
        inner.hands = HashMap::new();
        inner.discards.clear();
        inner.draw_pile.clear();
        inner.draw_pile_ids.clear();
        inner.start_pile = 0;
        inner.indicator_pile = 0;
        inner.indicator.clear();
        inner.okey_tile_id.clear();
        inner.solver_cache.clear();

        let mut deck = crate::tile::full_deck();
        crate::rng::shuffle_tiles(&mut deck);

        let mut piles = HashMap::with_capacity(15);
        let mut cursor = 0usize;
        for pile_id in 1..=15u8 {
            let count = if pile_id == 1 { 8 } else { 7 };
            piles.insert(pile_id, deck[cursor..cursor + count].to_vec());
            cursor += count;
        }
        inner.piles = piles;
        for pile_id in 1..=15u8 {
            inner.pile_counts.insert(pile_id, 0);
        }

        recalc_pile_owners(inner);

        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        inner.updated_at = unix_now();

        timers::spawn_interval_until(Arc::clone(self), Duration::from_secs(1), move |room| {
            room.on_build_pile_tick(generation)
        });
    }

    fn on_build_pile_tick(self: &Arc<Self>, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.timer_generation != generation || inner.state != RoomState::BuildPiles {
            return false;
        }

        inner.build_pile_idx += 1;
        let revealed = inner.build_pile_idx as u8;
        for pile_id in 1..=revealed.min(15) {
            let len = inner.piles.get(&pile_id).map(Vec::len).unwrap_or(0);
            inner.pile_counts.insert(pile_id, len);
        }
        inner.updated_at = unix_now();

        if inner.build_pile_idx >= 15 {
            self.start_dice_locked(&mut inner);
            return false;
        }
        true
    }

    fn start_dice_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        inner.state = RoomState::Dice;
        inner.dice_left = self.timing.dice.as_secs() as i32;
        inner.dice_value = crate::rng::roll_dice();
        inner.dice_stop_by = None;
        inner.updated_at = unix_now();

        inner.timer_generation += 1;
        let generation = inner.timer_generation;

        timers::spawn_interval_until(Arc::clone(self), Duration::from_secs(1), move |room| {
            room.on_dice_tick(generation)
        });
    }

    fn on_dice_tick(self: &Arc<Self>, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.timer_generation != generation || inner.state != RoomState::Dice {
            return false;
        }

        inner.dice_value = crate::rng::roll_dice();
        if inner.dice_left > 0 {
            inner.dice_left -= 1;
        }
        inner.updated_at = unix_now();

        if inner.dice_left <= 0 || inner.dice_stop_by.is_some() {
            self.apply_dice_and_prepare_deal_locked(&mut inner);
            return false;
        }
        true
    }

    /// Stops the dice roll early; only the current dealer may call this.
    pub fn dice_stop(&self, user_id: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.state != RoomState::Dice {
            return Err(RoomError::NotInDiceState);
        }
        let dealer = inner.players.get(&inner.dealer_seat).map(|p| p.user_id.clone());
        if dealer.as_deref() != Some(user_id) {
            return Err(RoomError::NotDealer);
        }
        inner.dice_stop_by = Some(user_id.to_string());
        inner.updated_at = unix_now();
        Ok(())
    }

    fn apply_dice_and_prepare_deal_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        inner.start_pile = inner.dice_value;
        if inner.start_pile != 1 {
            if let Some(extra) = inner.piles.get_mut(&1).and_then(Vec::pop) {
                inner.piles.entry(inner.start_pile).or_default().push(extra);
            }
        }

        inner.indicator_pile = wrap_pile(inner.start_pile as i32 - 3);
        if let Some(top) = inner.piles.get_mut(&inner.indicator_pile).and_then(Vec::pop) {
            inner.indicator = top;
        }
        inner.okey_tile_id = crate::tile::okey_base_from_indicator(&inner.indicator)
            .map(crate::tile::Base::to_id_string)
            .unwrap_or_default();

        for pile_id in 1..=15u8 {
            let len = inner.piles.get(&pile_id).map(Vec::len).unwrap_or(0);
            inner.pile_counts.insert(pile_id, len);
        }

        inner.state = RoomState::Dealing;
        inner.deal_left = self.timing.deal.as_secs() as i32;
        inner.deal_cursor = inner.start_pile;
        inner.deal_seat_cursor = next_seat(inner.dealer_seat);
        inner.updated_at = unix_now();

        inner.timer_generation += 1;
        let generation = inner.timer_generation;

        timers::spawn_interval_until(Arc::clone(self), Duration::from_secs(1), move |room| {
            room.on_deal_tick(generation)
        });
    }

    fn on_deal_tick(self: &Arc<Self>, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.timer_generation != generation || inner.state != RoomState::Dealing {
            return false;
        }

        if inner.deal_left <= 0 {
            self.finalize_after_deal_locked(&mut inner);
            return false;
        }

        let pile_id = wrap_pile(inner.deal_cursor as i32);
        let tiles = inner.piles.remove(&pile_id).unwrap_or_default();
        let seat = inner.deal_seat_cursor;
        inner.hands.entry(seat).or_default().extend(tiles);
        inner.pile_counts.insert(pile_id, 0);
        inner.deal_left -= 1;
        inner.deal_cursor = wrap_pile(inner.deal_cursor as i32 + 1);
        inner.deal_seat_cursor = next_seat(inner.deal_seat_cursor);
        inner.updated_at = unix_now();
        true
    }

    /// `deal_left`'s starting value also counts how many piles get dealt
    /// out before the remaining three become the draw pile.
    fn finalize_after_deal_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        let dealt_count = self.timing.deal.as_secs() as i32;
        let mut dealt = std::collections::HashSet::new();
        let mut cursor = inner.start_pile as i32;
        for _ in 0..dealt_count {
            dealt.insert(wrap_pile(cursor));
            cursor += 1;
        }

        let remaining: Vec<u8> = (1..=15u8).filter(|p| !dealt.contains(p)).collect();
        inner.draw_pile_ids = remaining.clone();
        inner.draw_pile.clear();
        for pile_id in &remaining {
            if let Some(tiles) = inner.piles.remove(pile_id) {
                inner.draw_pile.extend(tiles);
            }
            inner.pile_counts.insert(*pile_id, 0);
        }

        inner.state = RoomState::Playing;
        inner.turn_seat = next_seat(inner.dealer_seat);
        inner.turn_phase = Some(TurnPhase::WaitDiscard);
        inner.config_locked = true;
        inner.updated_at = unix_now();

        self.reset_turn_timer_locked(inner);
    }

    fn reset_turn_timer_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        inner.turn_timer_generation += 1;
        let generation = inner.turn_timer_generation;
        inner.turn_deadline = unix_now() + self.timing.turn.as_secs() as i64;

        timers::spawn_after(Arc::clone(self), self.timing.turn, move |room| {
            room.on_turn_timeout(generation);
        });
    }

    fn on_turn_timeout(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.state != RoomState::Playing || generation != inner.turn_timer_generation {
            return;
        }

        match inner.turn_phase {
            Some(TurnPhase::WaitDraw) => {
                if inner.draw_pile.is_empty() {
                    self.end_hand_locked(&mut inner);
                    return;
                }
                let tile = inner.draw_pile.remove(0);
                let seat = inner.turn_seat;
                inner.hands.entry(seat).or_default().push(tile);
                inner.turn_phase = Some(TurnPhase::WaitDiscard);
                inner.updated_at = unix_now();
                self.reset_turn_timer_locked(&mut inner);
            }
            Some(TurnPhase::WaitDiscard) => {
                let seat = inner.turn_seat;
                if let Some(hand) = inner.hands.get_mut(&seat) {
                    if !hand.is_empty() {
                        let idx = pick_auto_discard_index(hand);
                        let tile_id = hand.swap_remove(idx);
                        let user_id = inner
                            .players
                            .get(&seat)
                            .map(|p| p.user_id.clone())
                            .unwrap_or_default();
                        inner.discards.push(DiscardEvent {
                            tile_id,
                            seat,
                            user_id,
                            at: unix_now(),
                        });
                    }
                }
                inner.turn_seat = next_seat(seat);
                inner.turn_phase = Some(TurnPhase::WaitDraw);
                inner.updated_at = unix_now();

                if inner.draw_pile.is_empty() {
                    self.end_hand_locked(&mut inner);
                    return;
                }
                self.reset_turn_timer_locked(&mut inner);
            }
            None => {}
        }
    }

    fn end_hand_locked(self: &Arc<Self>, inner: &mut RoomInner) {
        inner.turn_timer_generation += 1;
        inner.turn_deadline = 0;
        inner.turn_seat = 0;
        inner.turn_phase = None;
        inner.hand_index += 1;

        if inner.config.hand_count > 0 && inner.hand_index >= inner.config.hand_count {
            inner.state = RoomState::Finished;
            inner.updated_at = unix_now();
            tracing::info!(target: LOG_TARGET, room = %self.id, "hand count reached, room finished");
            return;
        }

        inner.dealer_seat = next_seat(inner.dealer_seat);
        inner.auto_start_left = 0;
        inner.start_pile = 0;
        inner.indicator_pile = 0;
        inner.indicator.clear();
        inner.okey_tile_id.clear();
        inner.dice_left = 0;
        inner.dice_value = 0;
        inner.dice_stop_by = None;
        inner.deal_left = 0;
        inner.deal_cursor = 0;
        inner.deal_seat_cursor = 0;
        inner.build_pile_idx = 0;
        inner.discards.clear();
        inner.draw_pile.clear();
        inner.draw_pile_ids.clear();
        inner.hands = HashMap::new();
        inner.solver_cache.clear();
        for pile_id in 1..=15u8 {
            inner.pile_counts.insert(pile_id, 0);
        }

        inner.intermission_until = unix_now() + self.timing.intermission.as_secs() as i64;
        inner.state = RoomState::Intermission;
        inner.updated_at = unix_now();

        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        timers::spawn_after(Arc::clone(self), self.timing.intermission, move |room| {
            room.on_intermission_elapsed(generation);
        });
    }

    fn on_intermission_elapsed(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.state != RoomState::Intermission || inner.timer_generation != generation {
            return;
        }
        inner.intermission_until = 0;
        self.start_build_piles_locked(&mut inner);
    }

    /// Draws the top tile from the draw pile for the seat whose turn it is.
    pub fn draw(self: &Arc<Self>, user_id: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.state != RoomState::Playing {
            return Err(RoomError::GameNotStarted);
        }
        if inner.turn_phase != Some(TurnPhase::WaitDraw) {
            return Err(RoomError::NotWaitDraw);
        }
        let seat = inner
            .players
            .iter()
            .find(|(_, p)| p.user_id == user_id)
            .map(|(&s, _)| s)
            .unwrap_or(0);
        if seat == 0 {
            return Err(RoomError::UserNotInRoom);
        }
        if seat != inner.turn_seat {
            return Err(RoomError::NotYourTurn);
        }

        if inner.draw_pile.is_empty() {
            self.end_hand_locked(&mut inner);
            return Ok(());
        }

        let tile = inner.draw_pile.remove(0);
        inner.hands.entry(seat).or_default().push(tile);
        inner.turn_phase = Some(TurnPhase::WaitDiscard);
        inner.updated_at = unix_now();
        self.reset_turn_timer_locked(&mut inner);
        Ok(())
    }

    /// Discards `tile_id` from the hand of the seat whose turn it is,
    /// advancing play to the next seat.
    pub fn discard(self: &Arc<Self>, user_id: &str, tile_id: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.state != RoomState::Playing {
            return Err(RoomError::GameNotStarted);
        }
        if inner.turn_phase != Some(TurnPhase::WaitDiscard) {
            return Err(RoomError::NotWaitDiscard);
        }
        let seat = inner
            .players
            .iter()
            .find(|(_, p)| p.user_id == user_id)
            .map(|(&s, _)| s)
            .unwrap_or(0);
        if seat == 0 {
            return Err(RoomError::UserNotInRoom);
        }
        if seat != inner.turn_seat {
            return Err(RoomError::NotYourTurn);
        }
        if tile_id.is_empty() {
            return Err(RoomError::TileIdRequired);
        }

        let idx = {
            let hand = inner.hands.entry(seat).or_default();
            hand.iter().position(|t| t == tile_id)
        };
        let Some(idx) = idx else {
            return Err(RoomError::TileNotInHand);
        };
        inner.hands.get_mut(&seat).unwrap().swap_remove(idx);

        inner.discards.push(DiscardEvent {
            tile_id: tile_id.to_string(),
            seat,
            user_id: user_id.to_string(),
            at: unix_now(),
        });
        inner.turn_seat = next_seat(seat);
        inner.turn_phase = Some(TurnPhase::WaitDraw);
        inner.updated_at = unix_now();

        if inner.draw_pile.is_empty() {
            self.end_hand_locked(&mut inner);
            return Ok(());
        }
        self.reset_turn_timer_locked(&mut inner);
        Ok(())
    }

    /// Runs the meld solver against `user_id`'s current hand, caching the
    /// result under `userId:handHash:mode` for the lifetime of the hand.
    pub fn meld_suggest(&self, user_id: &str, mode: &str) -> Result<(String, bool, SolveResult), RoomError> {
        let seat = self.seat_of(user_id);
        if seat == 0 {
            return Err(RoomError::NotSeated);
        }

        let (hand, indicator, okey_base) = {
            let inner = self.inner.lock();
            (
                inner.hands.get(&seat).cloned().unwrap_or_default(),
                inner.indicator.clone(),
                inner.okey_tile_id.clone(),
            )
        };

        let hash = hand_hash(&hand);
        let mode_key = if mode.trim().is_empty() {
            "AUTO".to_string()
        } else {
            mode.trim().to_uppercase()
        };
        let cache_key = format!("{user_id}:{hash}:{mode_key}");

        if let Some(cached) = self.inner.lock().solver_cache.get(&cache_key).cloned() {
            return Ok((hash, true, cached));
        }

        let solve_mode = match mode_key.as_str() {
            "RUN" => SolveMode::Run,
            "PAIR" => SolveMode::Pair,
            _ => SolveMode::Auto,
        };

        let result = solver::suggest_melds(&hand, &indicator, &okey_base, solve_mode, self.timing.solver_budget);
        self.inner.lock().solver_cache.insert(cache_key, result.clone());
        Ok((hash, false, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_discard_prefers_lowest_rank() {
        let hand = vec!["R05-1".to_string(), "B02-1".to_string(), "K11-1".to_string()];
        assert_eq!(pick_auto_discard_index(&hand), 1);
    }

    #[test]
    fn auto_discard_tie_break_is_alphabetical_not_ryok() {
        // Same rank, colors R and B: alphabetical order picks B, not R.
        let hand = vec!["R05-1".to_string(), "B05-1".to_string()];
        assert_eq!(pick_auto_discard_index(&hand), 1);
    }

    #[test]
    fn auto_discard_never_picks_joker_while_normal_tiles_remain() {
        let hand = vec!["JOKER-1".to_string(), "K13-1".to_string()];
        assert_eq!(pick_auto_discard_index(&hand), 1);
    }

    #[test]
    fn hand_hash_is_order_independent() {
        let a = vec!["R01-1".to_string(), "B02-1".to_string()];
        let b = vec!["B02-1".to_string(), "R01-1".to_string()];
        assert_eq!(hand_hash(&a), hand_hash(&b));
    }
}
