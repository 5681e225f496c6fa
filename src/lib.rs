//! Roundhouse - settlement core for timed wagering mini-games.
//!
//! Runs repeating betting rounds per configured game, accepts bets during
//! an open window, draws one outcome per round, settles every ledgered bet
//! against it exactly once, and applies results to player balances through
//! an optimistic cache reconciled against an authoritative store.

pub mod api;
pub mod balance;
pub mod config;
pub mod engine;
pub mod errors;
pub mod games;
pub mod metrics;
pub mod round;

pub use balance::{BalanceCache, BalanceStore, InMemoryBalanceStore};
pub use config::{GameRuleSet, OutcomeDomain, PayoutTable, RuleBook};
pub use engine::Engine;
pub use errors::{EngineError, EngineResult, PlaceError, SettlementError};
pub use games::types::{Amount, Bet, BetSelection, GameFamily, Outcome, SettlementResult};
pub use metrics::EngineMetrics;
pub use round::{ClosedRound, EscalatedBet, RoundPhase, RoundScheduler, RoundView};
