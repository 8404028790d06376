//! Five-card and best-of-seven No-Limit Hold'em hand ranking.

mod rank;

pub use rank::{classify_five, rank_best, rank_five, HandCategory, HandRank};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A playing card suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub fn as_char(self) -> char {
        match self {
            Suit::Clubs => 'c',
            Suit::Diamonds => 'd',
            Suit::Hearts => 'h',
            Suit::Spades => 's',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'c' | 'C' => Some(Suit::Clubs),
            'd' | 'D' => Some(Suit::Diamonds),
            'h' | 'H' => Some(Suit::Hearts),
            's' | 'S' => Some(Suit::Spades),
            _ => None,
        }
    }
}

/// A single playing card: `rank` is 2..=14 (Ace high), `suit` one of four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: u8, suit: Suit) -> Self {
        debug_assert!((2..=14).contains(&rank), "card rank out of range: {rank}");
        Self { rank, suit }
    }

    /// All 52 distinct cards, in a fixed deterministic order.
    pub fn full_deck() -> Vec<Card> {
        let mut cards = Vec::with_capacity(52);
        for suit in [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades] {
            for rank in 2..=14u8 {
                cards.push(Card::new(rank, suit));
            }
        }
        cards
    }

    fn rank_glyph(self) -> &'static str {
        match self.rank {
            2 => "2",
            3 => "3",
            4 => "4",
            5 => "5",
            6 => "6",
            7 => "7",
            8 => "8",
            9 => "9",
            10 => "10",
            11 => "J",
            12 => "Q",
            13 => "K",
            14 => "A",
            other => unreachable!("invalid rank {other}"),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank_glyph(), self.suit.as_char())
    }
}

/// Parses a glyph string like `"A♠"` or `"10h"` into a [`Card`].
///
/// Accepts both the suit glyphs (♠♥♦♣) and ascii letters (s/h/d/c), to play
/// nicely with both test fixtures and wire text.
pub fn parse_card(s: &str) -> Option<Card> {
    let mut chars: Vec<char> = s.chars().collect();
    let suit_char = chars.pop()?;
    let suit = match suit_char {
        '♠' => Suit::Spades,
        '♥' => Suit::Hearts,
        '♦' => Suit::Diamonds,
        '♣' => Suit::Clubs,
        other => Suit::from_char(other)?,
    };
    let rank_str: String = chars.into_iter().collect();
    let rank = match rank_str.as_str() {
        "2" => 2,
        "3" => 3,
        "4" => 4,
        "5" => 5,
        "6" => 6,
        "7" => 7,
        "8" => 8,
        "9" => 9,
        "10" | "T" | "t" => 10,
        "J" | "j" => 11,
        "Q" | "q" => 12,
        "K" | "k" => 13,
        "A" | "a" => 14,
        _ => return None,
    };
    Some(Card::new(rank, suit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_deck_has_52_unique_cards() {
        let deck = Card::full_deck();
        assert_eq!(deck.len(), 52);
        let mut seen = std::collections::HashSet::new();
        for card in deck {
            assert!(seen.insert(card));
        }
    }

    #[test]
    fn parse_and_display_round_trip() {
        let card = parse_card("A♠").unwrap();
        assert_eq!(card.rank, 14);
        assert_eq!(card.suit, Suit::Spades);
        assert_eq!(card.to_string(), "As");
    }

    #[test]
    fn parse_ten_two_chars() {
        let card = parse_card("10h").unwrap();
        assert_eq!(card.rank, 10);
        assert_eq!(card.suit, Suit::Hearts);
    }
}
