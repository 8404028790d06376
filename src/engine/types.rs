use crate::hand_eval::Card;
use serde::{Deserialize, Serialize};

pub type Chips = u64;
pub type SeatIndex = u8;

/// The phase a table is in. Serializes to the lowercase strings the wire
/// protocol expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Settlement,
}

impl Street {
    pub fn is_betting_round(self) -> bool {
        matches!(self, Street::Preflop | Street::Flop | Street::Turn | Street::River)
    }

    pub fn next_betting_street(self) -> Option<Street> {
        match self {
            Street::Preflop => Some(Street::Flop),
            Street::Flop => Some(Street::Turn),
            Street::Turn => Some(Street::River),
            _ => None,
        }
    }
}

/// The kind of action a player submits. `amount` on `Bet`/`Raise` is the new
/// total street commitment, not a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Bet { amount: Chips },
    Raise { amount: Chips },
    #[serde(rename = "all-in")]
    AllIn,
}

impl PlayerAction {
    pub fn label(self) -> &'static str {
        match self {
            PlayerAction::Fold => "fold",
            PlayerAction::Check => "check",
            PlayerAction::Call => "call",
            PlayerAction::Bet { .. } => "bet",
            PlayerAction::Raise { .. } => "raise",
            PlayerAction::AllIn => "all-in",
        }
    }
}

/// A single seat at the table. Persists across hands; player-bearing
/// attributes are cleared when the seat is vacated.
#[derive(Debug, Clone)]
pub struct Seat {
    pub seat_index: SeatIndex,
    pub player_id: Option<String>,
    pub display_name: Option<String>,
    pub stack: Chips,
    pub hole_cards: Option<[Card; 2]>,
    pub last_action: Option<&'static str>,
    pub is_ready: bool,
    pub is_folded: bool,
    pub is_all_in: bool,
    pub is_connected: bool,
    pub street_commit: Chips,
    pub hand_commit: Chips,
}

impl Seat {
    pub fn empty(seat_index: SeatIndex) -> Self {
        Self {
            seat_index,
            player_id: None,
            display_name: None,
            stack: 0,
            hole_cards: None,
            last_action: None,
            is_ready: false,
            is_folded: false,
            is_all_in: false,
            is_connected: false,
            street_commit: 0,
            hand_commit: 0,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.player_id.is_some()
    }

    pub fn reset_per_hand(&mut self) {
        self.hole_cards = None;
        self.last_action = None;
        self.is_folded = false;
        self.is_all_in = false;
        self.street_commit = 0;
        self.hand_commit = 0;
    }

    pub fn reset_per_street(&mut self) {
        self.street_commit = 0;
    }

    pub fn clear(&mut self) {
        *self = Seat::empty(self.seat_index);
    }
}

/// Static per-table configuration. Defaults match the original source:
/// small_blind=1, big_blind=3, buy_in=100bb, auto_topup=300, max_players=6.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_players: u8,
    pub buy_in: Chips,
    pub auto_topup_amount: Chips,
    pub cashout: CashoutPolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        let big_blind = 3;
        Self {
            small_blind: 1,
            big_blind,
            max_players: 6,
            buy_in: big_blind * 100,
            auto_topup_amount: 300,
            cashout: CashoutPolicy::default(),
        }
    }
}

/// Resolves the `apply_auto_cashout` open question: surfaced as an opt-in
/// policy, disabled by default.
#[derive(Debug, Clone, Default)]
pub struct CashoutPolicy {
    pub enabled: bool,
    pub threshold_bb: Option<u32>,
    pub cashout_bb: Option<u32>,
}

/// An entry in the table's action log, mirroring the wire `ActionRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub action: String,
    pub amount: Option<Chips>,
    pub street: Street,
    pub detail: Option<String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

pub const POSITIONS_6MAX: [&str; 6] = ["BTN", "SB", "BB", "UTG", "HJ", "CO"];
pub const AUTO_PLAY_SAFETY_FACTOR: usize = 4;
