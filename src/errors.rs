//! Error types for the round settlement core.
//!
//! Placement rejections are user-correctable and surfaced synchronously with
//! a machine-readable reason code; settlement and store failures are
//! recoverable per bet and retried under a bounded budget.

use thiserror::Error;

/// Reasons a bet placement is rejected.
///
/// These are the only user-visible failures and are never retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceError {
    /// The target round is not accepting bets (wrong phase, past the lock
    /// boundary, or the round has already been drained).
    #[error("round not open for betting")]
    RoundNotOpen,

    /// stake * quantity exceeds the player's effective balance.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// The bet selection is not in the game's allowed bet kinds, or its
    /// value is outside the game's domain.
    #[error("invalid bet: {0}")]
    InvalidBet(String),

    /// No game is configured under the requested id.
    #[error("unknown game: {0}")]
    UnknownGame(String),
}

impl PlaceError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PlaceError::RoundNotOpen => "ROUND_NOT_OPEN",
            PlaceError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            PlaceError::InvalidBet(_) => "INVALID_BET_KIND",
            PlaceError::UnknownGame(_) => "UNKNOWN_GAME",
        }
    }
}

/// Failures while settling an individual bet.
///
/// Each failed bet is retried independently so one player's failure never
/// blocks settlement for others.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("payout calculation failed: {0}")]
    Payout(String),

    #[error("balance commit failed: {0}")]
    Commit(String),

    #[error("balance commit timed out")]
    CommitTimeout,
}

/// Failures from the authoritative balance store boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Rule-book loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rules file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid rule set '{game}': {reason}")]
    InvalidRuleSet { game: String, reason: String },

    #[error("duplicate game id: {0}")]
    DuplicateGame(String),
}

/// Top-level error for engine startup and operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
