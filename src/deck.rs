//! Shuffled 52-card deck production.

use crate::hand_eval::Card;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// A sequence of cards ready to be dealt, strongest source of randomness
/// first. Seedable for deterministic tests.
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Builds a fresh deck and shuffles it using entropy from the OS.
    pub fn shuffled() -> Self {
        let mut rng = StdRng::from_entropy();
        Self::shuffled_with(&mut rng)
    }

    /// Builds a fresh deck and shuffles it with the given seed, for
    /// reproducible tests.
    pub fn shuffled_with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::shuffled_with(&mut rng)
    }

    /// Builds a fresh deck shuffled with an injected RNG (Fisher-Yates).
    pub fn shuffled_with(rng: &mut impl RngCore) -> Self {
        let mut cards = Card::full_deck();
        for i in (1..cards.len()).rev() {
            let j = rng.gen_range(0..=i);
            cards.swap(i, j);
        }
        Self { cards }
    }

    /// Deals `n` cards off the top, removing them from the deck.
    pub fn deal(&mut self, n: usize) -> Vec<Card> {
        let at = self.cards.len().saturating_sub(n);
        self.cards.split_off(at)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_has_52_unique_cards() {
        let deck = Deck::shuffled_with_seed(7);
        assert_eq!(deck.cards.len(), 52);
        let mut seen = std::collections::HashSet::new();
        for card in &deck.cards {
            assert!(seen.insert(*card));
        }
    }

    #[test]
    fn same_seed_yields_same_order() {
        let a = Deck::shuffled_with_seed(42);
        let b = Deck::shuffled_with_seed(42);
        assert_eq!(a.cards, b.cards);
    }

    #[test]
    fn deal_removes_cards_from_deck() {
        let mut deck = Deck::shuffled_with_seed(1);
        let hole = deck.deal(2);
        assert_eq!(hole.len(), 2);
        assert_eq!(deck.remaining(), 50);
    }
}
