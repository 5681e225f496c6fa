pub mod history;
pub mod ledger;
pub mod scheduler;

pub use history::{ClosedRound, RoundHistory};
pub use ledger::BetLedger;
pub use scheduler::{EscalatedBet, EscalationRegistry, Round, RoundPhase, RoundScheduler, RoundView};
