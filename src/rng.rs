//! Process-wide cryptographic randomness: deck shuffling, dice rolls, and
//! room id generation.
//!
//! Every draw goes through `rand::rngs::OsRng` so the shuffle and dice
//! results cannot be predicted by a client.

use rand::seq::SliceRandom;
use rand::Rng;

const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_ID_LEN: usize = 6;

/// Fisher-Yates shuffle over a cryptographic RNG.
pub fn shuffle_tiles(tiles: &mut [String]) {
    tiles.shuffle(&mut rand::rngs::OsRng);
}

/// A single die roll in `[1, 6]`.
pub fn roll_dice() -> u8 {
    rand::rngs::OsRng.gen_range(1..=6)
}

/// A fresh 6-character room id drawn from the wire-stable alphabet.
pub fn generate_room_id() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..ROOM_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_ID_ALPHABET.len());
            ROOM_ID_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_has_expected_length_and_alphabet() {
        let id = generate_room_id();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id
            .bytes()
            .all(|b| ROOM_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn dice_is_in_range() {
        for _ in 0..200 {
            let v = roll_dice();
            assert!((1..=6).contains(&v));
        }
    }

    #[test]
    fn shuffle_preserves_multiset() {
        let mut tiles = crate::tile::full_deck();
        let mut sorted_before = tiles.clone();
        sorted_before.sort();
        shuffle_tiles(&mut tiles);
        let mut sorted_after = tiles.clone();
        sorted_after.sort();
        assert_eq!(sorted_before, sorted_after);
    }
}
