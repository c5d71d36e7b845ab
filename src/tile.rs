//! Tile identifier grammar, deck construction, and indicator/okey derivation.
//!
//! A tile id is a wire-stable string: either `JOKER-{1|2}` or
//! `{R|B|G|K}NN-{1|2}` where `NN` is a zero-padded rank `01..13`.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const RANKS: u8 = 13;

/// One of the four tile colors, ordered `R < B < G < K`: the sort rule
/// used when ranking a hand's unused tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Color {
    R,
    B,
    G,
    K,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::R, Color::B, Color::G, Color::K];

    fn as_char(self) -> char {
        match self {
            Color::R => 'R',
            Color::B => 'B',
            Color::G => 'G',
            Color::K => 'K',
        }
    }

    fn from_char(c: char) -> Option<Color> {
        match c {
            'R' => Some(Color::R),
            'B' => Some(Color::B),
            'G' => Some(Color::G),
            'K' => Some(Color::K),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A 3-character base, e.g. `R07`: the color plus rank with no copy suffix.
/// Real-okey membership and pairing are both decided by base equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Base {
    pub color: Color,
    pub rank: u8,
}

impl Base {
    pub fn new(color: Color, rank: u8) -> Self {
        Self { color, rank }
    }

    /// The base of the tile that follows this one in rank, wrapping 13 -> 1.
    pub fn next_rank(self) -> Base {
        let rank = if self.rank >= RANKS { 1 } else { self.rank + 1 };
        Base::new(self.color, rank)
    }

    pub fn to_id_string(self) -> String {
        format!("{}{:02}", self.color, self.rank)
    }

    pub fn parse(s: &str) -> Option<Base> {
        if s.len() != 3 {
            return None;
        }
        let mut chars = s.chars();
        let color = Color::from_char(chars.next()?)?;
        let rank: u8 = s[1..3].parse().ok()?;
        if !(1..=RANKS).contains(&rank) {
            return None;
        }
        Some(Base::new(color, rank))
    }
}

/// A fully parsed tile id: either a joker copy, or a color/rank/copy triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Joker(u8),
    Normal { color: Color, rank: u8, copy: u8 },
}

impl Tile {
    pub fn base(self) -> Option<Base> {
        match self {
            Tile::Joker(_) => None,
            Tile::Normal { color, rank, .. } => Some(Base::new(color, rank)),
        }
    }

    pub fn parse(id: &str) -> Option<Tile> {
        if let Some(rest) = id.strip_prefix("JOKER-") {
            let copy: u8 = rest.parse().ok()?;
            if copy == 1 || copy == 2 {
                return Some(Tile::Joker(copy));
            }
            return None;
        }
        let mut parts = id.splitn(2, '-');
        let base_part = parts.next()?;
        let copy_part = parts.next()?;
        let base = Base::parse(base_part)?;
        let copy: u8 = copy_part.parse().ok()?;
        if copy != 1 && copy != 2 {
            return None;
        }
        Some(Tile::Normal {
            color: base.color,
            rank: base.rank,
            copy,
        })
    }

    pub fn to_id_string(self) -> String {
        match self {
            Tile::Joker(copy) => format!("JOKER-{copy}"),
            Tile::Normal { color, rank, copy } => format!("{color}{rank:02}-{copy}"),
        }
    }
}

/// Returns the full 106-tile deck (unshuffled): every `{color}{rank}-{copy}`
/// plus the two jokers, in deterministic generation order.
pub fn full_deck() -> Vec<String> {
    let mut tiles = Vec::with_capacity(106);
    for color in Color::ALL {
        for rank in 1..=RANKS {
            tiles.push(format!("{color}{rank:02}-1"));
            tiles.push(format!("{color}{rank:02}-2"));
        }
    }
    tiles.push("JOKER-1".to_string());
    tiles.push("JOKER-2".to_string());
    tiles
}

/// Computes the real-okey base from a drawn indicator tile id.
///
/// Returns `None` if `indicator` does not parse as a normal (non-joker)
/// tile id — a malformed indicator should never occur in practice, but
/// callers treat `None` as "no okey tiles exist for the hand".
pub fn okey_base_from_indicator(indicator: &str) -> Option<Base> {
    let base = Base::parse(&indicator[..indicator.len().min(3)])?;
    Some(base.next_rank())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_normal_tile() {
        let t = Tile::parse("R07-1").unwrap();
        assert_eq!(
            t,
            Tile::Normal {
                color: Color::R,
                rank: 7,
                copy: 1
            }
        );
        assert_eq!(t.base(), Some(Base::new(Color::R, 7)));
    }

    #[test]
    fn parses_joker() {
        let t = Tile::parse("JOKER-2").unwrap();
        assert_eq!(t, Tile::Joker(2));
        assert_eq!(t.base(), None);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(Tile::parse("X07-1"), None);
        assert_eq!(Tile::parse("R14-1"), None);
        assert_eq!(Tile::parse("R07-3"), None);
        assert_eq!(Tile::parse("JOKER-3"), None);
        assert_eq!(Tile::parse(""), None);
    }

    #[test]
    fn full_deck_has_106_unique_tiles() {
        let deck = full_deck();
        assert_eq!(deck.len(), 106);
        let unique: std::collections::HashSet<_> = deck.iter().collect();
        assert_eq!(unique.len(), 106);
    }

    #[test]
    fn okey_base_wraps_rank_thirteen() {
        let base = okey_base_from_indicator("R13-1").unwrap();
        assert_eq!(base, Base::new(Color::R, 1));
    }

    #[test]
    fn okey_base_normal_case() {
        let base = okey_base_from_indicator("B02-1").unwrap();
        assert_eq!(base, Base::new(Color::B, 3));
    }
}
