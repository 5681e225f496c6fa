//! Engine wiring: one scheduler per configured game, each driven by its own
//! timer loop.
//!
//! Schedulers share no mutable state with each other; they interact with the
//! balance cache and store only through their contracts, so one game's
//! failures never propagate to sibling games.

use crate::balance::{BalanceCache, BalanceStore};
use crate::config::RuleBook;
use crate::errors::PlaceError;
use crate::games::outcome::OutcomeGenerator;
use crate::games::types::{Amount, BetSelection};
use crate::metrics::EngineMetrics;
use crate::round::history::ClosedRound;
use crate::round::scheduler::{EscalatedBet, EscalationRegistry, RoundScheduler, RoundView};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Default scheduler tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// The settlement engine: rule book, per-game schedulers, shared balance
/// accounting.
pub struct Engine {
    rule_book: RuleBook,
    schedulers: HashMap<String, Arc<RoundScheduler>>,
    balances: Arc<BalanceCache>,
    escalations: Arc<EscalationRegistry>,
    metrics: Arc<EngineMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// Build an engine over the given rule book and authoritative store.
    pub fn new(rule_book: RuleBook, store: Arc<dyn BalanceStore>) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let balances = Arc::new(BalanceCache::new(Arc::clone(&store), Arc::clone(&metrics)));
        let escalations = Arc::new(EscalationRegistry::new());
        let generator = Arc::new(OutcomeGenerator::new());
        let now = Utc::now();

        let mut schedulers = HashMap::new();
        for rules in rule_book.iter() {
            let scheduler = RoundScheduler::new(
                Arc::clone(rules),
                Arc::clone(&generator),
                Arc::clone(&balances),
                Arc::clone(&store),
                Arc::clone(&escalations),
                Arc::clone(&metrics),
                now,
            );
            schedulers.insert(rules.game_id.clone(), Arc::new(scheduler));
        }

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            rule_book,
            schedulers,
            balances,
            escalations,
            metrics,
            shutdown_tx,
        }
    }

    /// Spawn one timer loop per game. Loops exit on shutdown; an in-flight
    /// tick always completes first.
    pub fn start(&self, tick_interval: Duration) {
        for (game_id, scheduler) in &self.schedulers {
            let scheduler = Arc::clone(scheduler);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let game_id = game_id.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(tick_interval);
                tracing::info!(game = %game_id, "scheduler loop started");
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            scheduler.tick(Utc::now()).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                tracing::info!(game = %game_id, "scheduler loop stopped");
                                break;
                            }
                        }
                    }
                }
            });
        }
    }

    /// Signal all scheduler loops to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Bet intake: resolve the game id to its currently open round and
    /// place against it.
    pub fn place_bet(
        &self,
        player_id: &str,
        game_id: &str,
        selection: BetSelection,
        stake: Amount,
        quantity: u32,
    ) -> Result<Uuid, PlaceError> {
        let scheduler = self
            .schedulers
            .get(game_id)
            .ok_or_else(|| PlaceError::UnknownGame(game_id.to_string()))?;
        scheduler.place_bet(player_id, selection, stake, quantity, Utc::now())
    }

    /// Public view of a game's live round.
    pub fn current_round(&self, game_id: &str) -> Option<RoundView> {
        self.schedulers
            .get(game_id)
            .map(|scheduler| scheduler.current_round(Utc::now()))
    }

    /// Closed-round feed for a game, newest first.
    pub fn history(&self, game_id: &str, limit: usize) -> Option<Vec<ClosedRound>> {
        self.schedulers
            .get(game_id)
            .map(|scheduler| scheduler.recent_rounds(limit))
    }

    /// A player's effective balance (confirmed + pending). Warms the cache
    /// entry first so a cold read reflects the store.
    pub async fn balance_of(&self, player_id: &str) -> Amount {
        if self.balances.get(player_id) == 0 {
            // Cold or empty entry: one authoritative fetch before answering.
            let _ = self.balances.reconcile_now(player_id).await;
        }
        self.balances.get(player_id)
    }

    /// Bets that exhausted their settlement retry budget.
    pub fn escalations(&self) -> Vec<EscalatedBet> {
        self.escalations.list()
    }

    pub fn game_ids(&self) -> Vec<String> {
        self.rule_book.game_ids()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn balances(&self) -> Arc<BalanceCache> {
        Arc::clone(&self.balances)
    }

    /// Direct scheduler access for tests and diagnostics.
    pub fn scheduler(&self, game_id: &str) -> Option<Arc<RoundScheduler>> {
        self.schedulers.get(game_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::InMemoryBalanceStore;
    use crate::games::types::CashOut;

    #[tokio::test]
    async fn test_engine_builds_all_games() {
        let store = Arc::new(InMemoryBalanceStore::new());
        let engine = Engine::new(RuleBook::builtin(), store);

        assert_eq!(engine.game_ids().len(), 5);
        for game_id in engine.game_ids() {
            let view = engine.current_round(&game_id).unwrap();
            assert_eq!(view.game_id, game_id);
        }
    }

    #[tokio::test]
    async fn test_unknown_game_rejected() {
        let store = Arc::new(InMemoryBalanceStore::new());
        let engine = Engine::new(RuleBook::builtin(), store);

        let err = engine
            .place_bet(
                "p1",
                "roulette",
                BetSelection::Crash { cash_out: CashOut::Auto { target: 2.0 } },
                100,
                1,
            )
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_GAME");
    }

    #[tokio::test]
    async fn test_balance_of_warms_from_store() {
        let store = Arc::new(InMemoryBalanceStore::new());
        store.set_balance("p1", 5_000);
        let engine = Engine::new(RuleBook::builtin(), store);

        assert_eq!(engine.balance_of("p1").await, 5_000);
    }
}
