use super::types::{Seat, SeatIndex, POSITIONS_6MAX};

/// Cyclic walk over seat indices `0..len`, excluding the caller-supplied
/// `wrap` length. Returns the next occupied seat strictly after `from`
/// (wrapping), or `None` if no other seat is occupied.
pub fn next_occupied_seat(seats: &[Seat], from: SeatIndex) -> Option<SeatIndex> {
    let len = seats.len();
    for step in 1..=len {
        let idx = (from as usize + step) % len;
        if seats[idx].is_occupied() {
            return Some(idx as SeatIndex);
        }
    }
    None
}

/// Next seat after `from` that is still in the hand and not all-in — i.e.
/// eligible to act. Wraps; returns `None` if no seat qualifies.
pub fn next_active_seat(seats: &[Seat], from: SeatIndex) -> Option<SeatIndex> {
    let len = seats.len();
    for step in 1..=len {
        let idx = (from as usize + step) % len;
        let seat = &seats[idx];
        if seat.hole_cards.is_some() && !seat.is_folded && !seat.is_all_in {
            return Some(idx as SeatIndex);
        }
    }
    None
}

/// Assigns position labels cyclically from `dealer_seat` over occupied
/// seats. Heads-up is special-cased: dealer is BTN/SB, the other seat is BB.
pub fn compute_positions(seats: &[Seat], dealer_seat: SeatIndex) -> Vec<(SeatIndex, &'static str)> {
    let occupied: Vec<SeatIndex> = seats
        .iter()
        .filter(|s| s.is_occupied())
        .map(|s| s.seat_index)
        .collect();
    if occupied.len() < 2 {
        return occupied.into_iter().map(|s| (s, "BTN")).collect();
    }
    if occupied.len() == 2 {
        let other = occupied.iter().find(|&&s| s != dealer_seat).copied().unwrap_or(dealer_seat);
        return vec![(dealer_seat, "BTN"), (other, "BB")];
    }
    let start = occupied
        .iter()
        .position(|&s| s == dealer_seat)
        .unwrap_or(0);
    let mut out = Vec::with_capacity(occupied.len());
    for (i, &seat) in occupied.iter().cycle().skip(start).take(occupied.len()).enumerate() {
        let label = POSITIONS_6MAX.get(i).copied().unwrap_or("CO");
        out.push((seat, label));
    }
    out
}

/// Position order used to distribute split-pot remainders: SB, BB, UTG, HJ,
/// CO, BTN — i.e. first-to-act order rather than button-relative order.
pub fn remainder_distribution_order(seats: &[Seat], dealer_seat: SeatIndex) -> Vec<SeatIndex> {
    let positions = compute_positions(seats, dealer_seat);
    if positions.len() == 2 {
        // Heads-up: `compute_positions` labels the dealer "BTN" for display,
        // but the dealer posts the small blind and acts first.
        return positions.into_iter().map(|(seat, _)| seat).collect();
    }
    let order = ["SB", "BB", "UTG", "HJ", "CO", "BTN"];
    let mut out = Vec::new();
    for label in order {
        for &(seat, pos) in &positions {
            if pos == label {
                out.push(seat);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Seat;

    fn occupied_seats(n: usize, occupied_indices: &[usize]) -> Vec<Seat> {
        (0..n)
            .map(|i| {
                let mut seat = Seat::empty(i as SeatIndex);
                if occupied_indices.contains(&i) {
                    seat.player_id = Some(format!("p{i}"));
                }
                seat
            })
            .collect()
    }

    #[test]
    fn next_occupied_wraps() {
        let seats = occupied_seats(6, &[0, 3]);
        assert_eq!(next_occupied_seat(&seats, 3), Some(0));
        assert_eq!(next_occupied_seat(&seats, 0), Some(3));
    }

    #[test]
    fn heads_up_remainder_order_puts_dealer_first() {
        // Heads-up: the dealer posts the small blind and acts first, even
        // though `compute_positions` displays them as "BTN".
        let seats = occupied_seats(6, &[0, 3]);
        let order = remainder_distribution_order(&seats, 0);
        assert_eq!(order, vec![0, 3]);
    }

    #[test]
    fn heads_up_positions() {
        let seats = occupied_seats(6, &[0, 3]);
        let positions = compute_positions(&seats, 0);
        assert!(positions.contains(&(0, "BTN")));
        assert!(positions.contains(&(3, "BB")));
    }
}
