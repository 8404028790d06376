use super::Card;
use serde::{Deserialize, Serialize};

/// The nine mutually exclusive hand categories, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum HandCategory {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

impl HandCategory {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A total-order comparable hand rank: category dominant, tiebreakers lexicographic.
///
/// Deriving `Ord` on a tuple-like struct gives exactly the comparison the
/// category/tiebreaker pair needs: category compares first, then the
/// tiebreaker vector compares element-by-element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandRank {
    pub category: HandCategory,
    pub tiebreakers: Vec<u8>,
}

impl HandRank {
    pub fn new(category: HandCategory, tiebreakers: Vec<u8>) -> Self {
        Self {
            category,
            tiebreakers,
        }
    }

    pub fn as_tuple(&self) -> (u8, &[u8]) {
        (self.category.as_u8(), &self.tiebreakers)
    }
}

fn rank_histogram(cards: &[Card; 5]) -> [u8; 15] {
    let mut counts = [0u8; 15];
    for card in cards {
        counts[card.rank as usize] += 1;
    }
    counts
}

fn is_flush(cards: &[Card; 5]) -> bool {
    let suit = cards[0].suit;
    cards.iter().all(|c| c.suit == suit)
}

/// Returns the straight's high card if the five ranks form a straight
/// (duplicates already ruled out by the caller), treating A-2-3-4-5 (the
/// wheel) as a straight with high card 5.
fn straight_high(mut ranks: Vec<u8>) -> Option<u8> {
    ranks.sort_unstable();
    ranks.dedup();
    if ranks.len() != 5 {
        return None;
    }
    if ranks == [2, 3, 4, 5, 14] {
        return Some(5);
    }
    let is_run = ranks.windows(2).all(|w| w[1] - w[0] == 1);
    if is_run {
        Some(ranks[4])
    } else {
        None
    }
}

/// Classifies exactly five cards into a category and its tiebreaker vector.
pub fn classify_five(cards: [Card; 5]) -> HandRank {
    let counts = rank_histogram(&cards);
    let flush = is_flush(&cards);
    let ranks: Vec<u8> = cards.iter().map(|c| c.rank).collect();
    let straight = straight_high(ranks.clone());

    // Group ranks by multiplicity, each group sorted descending by rank.
    let mut by_count: Vec<(u8, u8)> = Vec::new(); // (count, rank)
    for rank in (2..=14u8).rev() {
        let count = counts[rank as usize];
        if count > 0 {
            by_count.push((count, rank));
        }
    }
    by_count.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    if let Some(high) = straight {
        if flush {
            return HandRank::new(HandCategory::StraightFlush, vec![high]);
        }
    }

    if by_count[0].0 == 4 {
        let quad = by_count[0].1;
        let kicker = by_count[1].1;
        return HandRank::new(HandCategory::FourOfAKind, vec![quad, kicker]);
    }

    if by_count[0].0 == 3 && by_count.len() > 1 && by_count[1].0 >= 2 {
        let trips = by_count[0].1;
        let pair = by_count[1].1;
        return HandRank::new(HandCategory::FullHouse, vec![trips, pair]);
    }

    if flush {
        let mut desc = ranks.clone();
        desc.sort_unstable_by(|a, b| b.cmp(a));
        return HandRank::new(HandCategory::Flush, desc);
    }

    if let Some(high) = straight {
        return HandRank::new(HandCategory::Straight, vec![high]);
    }

    if by_count[0].0 == 3 {
        let trips = by_count[0].1;
        let mut kickers: Vec<u8> = by_count[1..].iter().map(|&(_, r)| r).collect();
        kickers.sort_unstable_by(|a, b| b.cmp(a));
        return HandRank::new(
            HandCategory::ThreeOfAKind,
            [trips, kickers[0], kickers[1]].to_vec(),
        );
    }

    if by_count[0].0 == 2 && by_count.len() > 1 && by_count[1].0 == 2 {
        let high_pair = by_count[0].1;
        let low_pair = by_count[1].1;
        let kicker = by_count[2].1;
        return HandRank::new(
            HandCategory::TwoPair,
            vec![high_pair, low_pair, kicker],
        );
    }

    if by_count[0].0 == 2 {
        let pair = by_count[0].1;
        let mut kickers: Vec<u8> = by_count[1..].iter().map(|&(_, r)| r).collect();
        kickers.sort_unstable_by(|a, b| b.cmp(a));
        return HandRank::new(
            HandCategory::OnePair,
            [pair, kickers[0], kickers[1], kickers[2]].to_vec(),
        );
    }

    let mut desc = ranks;
    desc.sort_unstable_by(|a, b| b.cmp(a));
    HandRank::new(HandCategory::HighCard, desc)
}

/// Ranks exactly five cards, returning `(category, tiebreakers)`.
pub fn rank_five(cards: [Card; 5]) -> (u8, Vec<u8>) {
    let rank = classify_five(cards);
    (rank.category.as_u8(), rank.tiebreakers)
}

/// Ranks the best five-card hand out of seven cards, enumerating all
/// C(7,5) = 21 subsets.
pub fn rank_best(seven: [Card; 7]) -> (u8, Vec<u8>) {
    let mut best: Option<HandRank> = None;
    for a in 0..=2usize {
        for b in (a + 1)..=3 {
            for c in (b + 1)..=4 {
                for d in (c + 1)..=5 {
                    for e in (d + 1)..=6 {
                        let five = [seven[a], seven[b], seven[c], seven[d], seven[e]];
                        let rank = classify_five(five);
                        if best.as_ref().map_or(true, |b| rank > *b) {
                            best = Some(rank);
                        }
                    }
                }
            }
        }
    }
    let best = best.expect("21 subsets of 7 always yield at least one hand");
    (best.category.as_u8(), best.tiebreakers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand_eval::parse_card;

    fn hand(glyphs: [&str; 5]) -> [Card; 5] {
        glyphs.map(|g| parse_card(g).unwrap())
    }

    fn seven(glyphs: [&str; 7]) -> [Card; 7] {
        glyphs.map(|g| parse_card(g).unwrap())
    }

    #[test]
    fn s1_royal_flush() {
        let (cat, tb) = rank_five(hand(["A♠", "K♠", "Q♠", "J♠", "10♠"]));
        assert_eq!(cat, 8);
        assert_eq!(tb, vec![14]);
    }

    #[test]
    fn s1_wheel_straight_flush() {
        let (cat, tb) = rank_five(hand(["A♠", "2♠", "3♠", "4♠", "5♠"]));
        assert_eq!(cat, 8);
        assert_eq!(tb, vec![5]);
    }

    #[test]
    fn s2_best_of_seven_wheel_straight() {
        let (cat, tb) = rank_best(seven(["A♠", "2♠", "3♦", "4♣", "5♥", "K♠", "Q♣"]));
        assert_eq!(cat, 4);
        assert_eq!(tb, vec![5]);
    }

    #[test]
    fn rank_five_invariant_under_permutation() {
        let h1 = hand(["A♠", "K♠", "Q♠", "J♠", "10♠"]);
        let mut h2 = h1;
        h2.reverse();
        assert_eq!(rank_five(h1), rank_five(h2));
    }

    #[test]
    fn four_of_a_kind_kicker_breaks_ties() {
        let better = hand(["A♠", "A♥", "A♦", "A♣", "K♠"]);
        let worse = hand(["A♠", "A♥", "A♦", "A♣", "2♠"]);
        assert!(classify_five(better) > classify_five(worse));
    }

    #[test]
    fn full_house_compares_trips_then_pair() {
        let aaa_kk = hand(["A♠", "A♥", "A♦", "K♣", "K♠"]);
        let kkk_aa = hand(["K♠", "K♥", "K♦", "A♣", "A♠"]);
        assert!(classify_five(aaa_kk) > classify_five(kkk_aa));
    }

    #[test]
    fn two_pair_tiebreak_is_high_low_kicker() {
        let (cat, tb) = rank_five(hand(["A♠", "A♥", "K♦", "K♣", "2♠"]));
        assert_eq!(cat, 2);
        assert_eq!(tb, vec![14, 13, 2]);
    }

    #[test]
    fn rank_best_dominates_every_five_subset() {
        let cards = seven(["A♠", "A♥", "A♦", "K♣", "K♠", "2♦", "3♥"]);
        let best = rank_best(cards);
        for a in 0..=2usize {
            for b in (a + 1)..=3 {
                for c in (b + 1)..=4 {
                    for d in (c + 1)..=5 {
                        for e in (d + 1)..=6 {
                            let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                            let sub = rank_five(five);
                            assert!(best >= sub);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn flush_compares_lexicographically() {
        let a = hand(["A♠", "K♠", "9♠", "4♠", "2♠"]);
        let b = hand(["A♠", "K♠", "9♠", "3♠", "2♠"]);
        assert!(classify_five(a) > classify_five(b));
    }
}
