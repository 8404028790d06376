use thiserror::Error;

/// Errors returned while admitting or applying a player action. Never kills
/// the connection — the hub echoes these as `error` outbound messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("player is not seated at this table")]
    NotSeated,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("player has already folded")]
    PlayerFolded,
    #[error("player is already all-in")]
    PlayerAllIn,
    #[error("cannot check while facing a bet")]
    CannotCheck,
    #[error("nothing to call")]
    NothingToCall,
    #[error("insufficient stack for this action")]
    InsufficientStack,
    #[error("bet amount must be greater than zero")]
    BetAmountRequired,
    #[error("cannot bet when a bet already exists")]
    BetWhileBetExists,
    #[error("cannot raise without an existing bet")]
    RaiseWithoutBet,
    #[error("raise amount must exceed the current bet")]
    RaiseAmountTooSmall,
    #[error("raise is below the minimum legal raise")]
    RaiseBelowMin,
    #[error("this seat's raise has not been reopened")]
    RaiseNotReopened,
    #[error("player has no remaining stack")]
    NoStack,
    #[error("unknown action")]
    UnknownAction,
}

/// Errors returned from seating operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SeatingError {
    #[error("seat index out of range")]
    BadSeat,
    #[error("seat is already occupied")]
    SeatOccupied,
    #[error("player is already seated at a different seat")]
    AlreadySeated,
    #[error("table is full")]
    TableFull,
}
