//! Bet ledger: accepts, stores, and drains bets for open rounds.
//!
//! `place` is safe to call concurrently from many players against the same
//! round. `drain` flips the round's open flag under the same lock that
//! guards the bet list, so it is the hard cutover: once a drain begins, any
//! concurrent `place` for that round is rejected even if the wall-clock lock
//! time has not technically elapsed.

use crate::errors::PlaceError;
use crate::games::types::{Bet, RoundId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct RoundBook {
    /// Fast-path gate; authoritative rejection happens under the bets lock.
    open: AtomicBool,
    bets: Mutex<Vec<Bet>>,
}

impl RoundBook {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            bets: Mutex::new(Vec::new()),
        }
    }
}

/// Append-only bet storage for one game instance, keyed by round.
pub struct BetLedger {
    books: DashMap<RoundId, Arc<RoundBook>>,
    max_bets_per_player: u32,
}

impl BetLedger {
    pub fn new(max_bets_per_player: u32) -> Self {
        Self {
            books: DashMap::new(),
            max_bets_per_player,
        }
    }

    /// Open a book for a new round. Called once per round by the scheduler.
    pub fn open_round(&self, round_id: RoundId) {
        self.books.insert(round_id, Arc::new(RoundBook::new()));
    }

    /// Record a bet against an open round.
    pub fn place(&self, bet: Bet) -> Result<(), PlaceError> {
        let book = self
            .books
            .get(&bet.round_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PlaceError::RoundNotOpen)?;

        if !book.open.load(Ordering::Acquire) {
            return Err(PlaceError::RoundNotOpen);
        }

        let mut bets = book.bets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Re-check under the lock: a drain may have begun since the fast
        // path.
        if !book.open.load(Ordering::Acquire) {
            return Err(PlaceError::RoundNotOpen);
        }

        let player_bets = bets.iter().filter(|b| b.player_id == bet.player_id).count();
        if player_bets >= self.max_bets_per_player as usize {
            return Err(PlaceError::InvalidBet(format!(
                "player already holds {} bets this round",
                player_bets
            )));
        }

        bets.push(bet);
        Ok(())
    }

    /// Close the round's book and take all its bets.
    ///
    /// This is the single point at which "this round's bets are final" is
    /// established; the scheduler calls it exactly once per round.
    pub fn drain(&self, round_id: RoundId) -> Vec<Bet> {
        let Some(book) = self.books.get(&round_id).map(|entry| Arc::clone(entry.value())) else {
            return Vec::new();
        };

        let drained = {
            let mut bets = book.bets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            book.open.store(false, Ordering::Release);
            std::mem::take(&mut *bets)
        };

        self.books.remove(&round_id);
        drained
    }

    /// Number of bets currently held for a round.
    pub fn bet_count(&self, round_id: RoundId) -> usize {
        self.books
            .get(&round_id)
            .map(|book| {
                book.bets
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .len()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::BetSelection;
    use chrono::Utc;
    use uuid::Uuid;

    fn bet(player: &str, round_id: RoundId) -> Bet {
        Bet {
            id: Uuid::new_v4(),
            player_id: player.to_string(),
            game_id: "lottery-30s".to_string(),
            round_id,
            selection: BetSelection::Number { number: 7 },
            stake: 100,
            quantity: 1,
            placed_at: Utc::now(),
        }
    }

    #[test]
    fn test_place_and_drain() {
        let ledger = BetLedger::new(20);
        ledger.open_round(1);

        assert!(ledger.place(bet("p1", 1)).is_ok());
        assert!(ledger.place(bet("p2", 1)).is_ok());
        assert_eq!(ledger.bet_count(1), 2);

        let drained = ledger.drain(1);
        assert_eq!(drained.len(), 2);
        assert_eq!(ledger.bet_count(1), 0);
    }

    #[test]
    fn test_place_after_drain_rejected() {
        let ledger = BetLedger::new(20);
        ledger.open_round(1);
        ledger.drain(1);

        assert_eq!(ledger.place(bet("p1", 1)), Err(PlaceError::RoundNotOpen));
    }

    #[test]
    fn test_place_unknown_round_rejected() {
        let ledger = BetLedger::new(20);
        assert_eq!(ledger.place(bet("p1", 9)), Err(PlaceError::RoundNotOpen));
    }

    #[test]
    fn test_per_player_cap() {
        let ledger = BetLedger::new(2);
        ledger.open_round(1);

        assert!(ledger.place(bet("p1", 1)).is_ok());
        assert!(ledger.place(bet("p1", 1)).is_ok());
        let err = ledger.place(bet("p1", 1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_BET_KIND");
        // Other players are unaffected by p1's cap.
        assert!(ledger.place(bet("p2", 1)).is_ok());
    }

    #[test]
    fn test_drain_twice_yields_nothing() {
        let ledger = BetLedger::new(20);
        ledger.open_round(1);
        ledger.place(bet("p1", 1)).unwrap();

        assert_eq!(ledger.drain(1).len(), 1);
        assert!(ledger.drain(1).is_empty());
    }

    #[test]
    fn test_concurrent_placement() {
        let ledger = Arc::new(BetLedger::new(1000));
        ledger.open_round(1);

        let mut handles = Vec::new();
        for t in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                let mut accepted = 0;
                for _ in 0..50 {
                    if ledger.place(bet(&format!("p{}", t), 1)).is_ok() {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 400);
        assert_eq!(ledger.drain(1).len(), 400);
    }
}
