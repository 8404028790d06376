use super::types::{ActionRecord, Chips, SeatIndex, Street};
use crate::hand_eval::Card;
use serde::{Deserialize, Serialize};

/// Wire representation of one seat, matching the original schema's
/// `SeatState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatState {
    pub seat_index: SeatIndex,
    pub player_id: Option<String>,
    pub name: Option<String>,
    pub stack: Chips,
    pub position: Option<&'static str>,
    pub last_action: Option<&'static str>,
    pub hole_cards: Option<Vec<Card>>,
    pub is_connected: bool,
    pub is_ready: bool,
    pub is_folded: bool,
    pub is_all_in: bool,
    pub street_commit: Chips,
    pub raise_blocked: bool,
}

/// Wire snapshot of the whole table, matching the original schema's
/// `TableState`. `hand_start_stack` and `pot_breakdown_excl_current_street`
/// are present only in the richer draft of the schema; they are optional
/// here so simpler clients can ignore them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableState {
    pub table_id: String,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_players: u8,
    pub dealer_seat: SeatIndex,
    pub street: Street,
    pub pot: Chips,
    pub current_bet: Chips,
    pub min_raise: Chips,
    pub board: Vec<Card>,
    pub seats: Vec<SeatState>,
    pub action_history: Vec<ActionRecord>,
    pub current_turn_seat: Option<SeatIndex>,
    pub hand_number: u64,
    pub save_earnings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand_start_stack: Option<std::collections::HashMap<SeatIndex, Chips>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pot_breakdown_excl_current_street: Option<Chips>,
}
