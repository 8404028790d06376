use super::types::{Chips, SeatIndex};
use std::collections::{BTreeMap, HashSet};

/// One pot layer: the chip amount in the layer and the seats eligible to
/// win it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PotLayer {
    pub amount: Chips,
    pub eligible: Vec<SeatIndex>,
}

/// Builds side-pot layers from every seat's total hand contribution,
/// `contribs`, including seats that folded after putting money in — their
/// chips still have to land in some layer's `amount`, they just can't be
/// eligible to win it. Winner eligibility is restricted to `eligible_seats`
/// (the still-in-hand seats).
///
/// Sorts distinct non-zero contribution levels ascending, then walks them,
/// forming a layer of `(level_i - level_{i-1}) * contributors_at_or_above`
/// chips. If a level's contributors are all folded (no in-hand seat reaches
/// it), its amount carries forward into the next layer that does have an
/// eligible winner, so every contributed chip still lands somewhere.
pub fn compute_side_pots(
    contribs: &BTreeMap<SeatIndex, Chips>,
    eligible_seats: &HashSet<SeatIndex>,
) -> Vec<PotLayer> {
    let mut levels: Vec<Chips> = contribs.values().copied().filter(|&c| c > 0).collect();
    levels.sort_unstable();
    levels.dedup();

    let mut layers = Vec::new();
    let mut previous = 0u64;
    let mut carry = 0u64;
    for &level in &levels {
        let contributors_at_level = contribs.iter().filter(|(_, &c)| c >= level).count() as u64;
        let eligible: Vec<SeatIndex> = contribs
            .iter()
            .filter(|(seat, &c)| c >= level && eligible_seats.contains(seat))
            .map(|(&seat, _)| seat)
            .collect();
        let diff = level - previous;
        let amount = diff * contributors_at_level + carry;
        if eligible.is_empty() {
            carry = amount;
        } else {
            carry = 0;
            if amount > 0 {
                layers.push(PotLayer { amount, eligible });
            }
        }
        previous = level;
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_three_way_all_in_side_pots() {
        let mut contribs = BTreeMap::new();
        contribs.insert(0u8, 50u64);
        contribs.insert(1u8, 150u64);
        contribs.insert(2u8, 300u64);
        let eligible: HashSet<SeatIndex> = [0, 1, 2].into_iter().collect();

        let layers = compute_side_pots(&contribs, &eligible);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].amount, 150); // 50 * 3
        assert_eq!(layers[0].eligible.len(), 3);
        assert_eq!(layers[1].amount, 200); // 100 * 2
        assert_eq!(layers[1].eligible.len(), 2);
        assert_eq!(layers[2].amount, 150); // 150 * 1
        assert_eq!(layers[2].eligible, vec![2]);
    }

    #[test]
    fn pot_sum_equals_total_contributions() {
        let mut contribs = BTreeMap::new();
        contribs.insert(0u8, 20u64);
        contribs.insert(1u8, 20u64);
        contribs.insert(2u8, 60u64);
        let eligible: HashSet<SeatIndex> = [0, 1, 2].into_iter().collect();
        let layers = compute_side_pots(&contribs, &eligible);
        let total: u64 = layers.iter().map(|l| l.amount).sum();
        let expected: u64 = contribs.values().sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn equal_contributions_yield_single_pot() {
        let mut contribs = BTreeMap::new();
        contribs.insert(0u8, 100u64);
        contribs.insert(1u8, 100u64);
        let eligible: HashSet<SeatIndex> = [0, 1].into_iter().collect();
        let layers = compute_side_pots(&contribs, &eligible);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].amount, 200);
    }

    #[test]
    fn folded_dead_money_is_conserved_and_unwinnable() {
        // SB posts 1 then folds; BB and UTG go to showdown at 3 each.
        let mut contribs = BTreeMap::new();
        contribs.insert(0u8, 1u64); // folded SB
        contribs.insert(1u8, 3u64); // BB, in hand
        contribs.insert(2u8, 3u64); // UTG, in hand
        let eligible: HashSet<SeatIndex> = [1, 2].into_iter().collect();

        let layers = compute_side_pots(&contribs, &eligible);
        let total: u64 = layers.iter().map(|l| l.amount).sum();
        assert_eq!(total, 7);
        for layer in &layers {
            assert!(layer.eligible.iter().all(|s| eligible.contains(s)));
        }
    }
}
