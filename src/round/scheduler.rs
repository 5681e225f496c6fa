//! Round scheduler: drives one game instance through its phase sequence.
//!
//! Phases are a pure function of `now` and the round's recorded timestamps,
//! recomputed on every tick, so there are no decrementing counters to
//! drift and the machine is resumable after a restart. `tick` is idempotent:
//! outcome draw and ledger drain are gated on a one-shot flag set atomically
//! when the lock boundary passes, so redundant ticks can never double-draw
//! or double-settle.

use crate::balance::{BalanceCache, BalanceStore};
use crate::config::GameRuleSet;
use crate::errors::{PlaceError, SettlementError};
use crate::games::outcome::OutcomeGenerator;
use crate::games::payout;
use crate::games::types::{Amount, Bet, BetSelection, Outcome, RoundId, SettlementResult};
use crate::metrics::EngineMetrics;
use crate::round::history::{ClosedRound, RoundHistory};
use crate::round::ledger::BetLedger;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Retry budget per bet before a settlement failure escalates.
const MAX_SETTLE_ATTEMPTS: u32 = 5;
/// Bound on a single authoritative balance commit.
const COMMIT_TIMEOUT: Duration = Duration::from_secs(2);
/// Closed rounds retained per game for the history feed.
const HISTORY_CAPACITY: usize = 100;

/// Round lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    Open,
    Locked,
    Settling,
    Closed,
}

/// One instance of a game's lifecycle. Mutated only by its scheduler.
#[derive(Debug, Clone)]
pub struct Round {
    pub round_id: RoundId,
    pub opened_at: DateTime<Utc>,
    /// Betting closes here: opened_at + betting window - lock grace.
    pub lock_at: DateTime<Utc>,
    /// Nominal end of betting + drawing.
    pub closes_at: DateTime<Utc>,
    pub result_display_until: DateTime<Utc>,
    /// Present only once settlement has begun; immutable once set.
    pub outcome: Option<Outcome>,
}

impl Round {
    fn open(rules: &GameRuleSet, round_id: RoundId, opened_at: DateTime<Utc>) -> Self {
        let betting = ChronoDuration::seconds(
            rules.betting_window_secs.saturating_sub(rules.lock_grace_secs) as i64,
        );
        let nominal_betting = ChronoDuration::seconds(rules.betting_window_secs as i64);
        let drawing = ChronoDuration::seconds(rules.drawing_window_secs as i64);
        let display = ChronoDuration::seconds(rules.result_display_secs as i64);

        let closes_at = opened_at + nominal_betting + drawing;
        Self {
            round_id,
            opened_at,
            lock_at: opened_at + betting,
            closes_at,
            result_display_until: closes_at + display,
            outcome: None,
        }
    }

    /// Current phase, derived from the clock and settlement progress.
    pub fn phase(&self, now: DateTime<Utc>, fully_settled: bool) -> RoundPhase {
        if self.outcome.is_none() {
            if now < self.lock_at {
                RoundPhase::Open
            } else {
                // Boundary state: no bets after this instant, result not
                // yet known. The next tick draws and moves to Settling.
                RoundPhase::Locked
            }
        } else if !fully_settled || now < self.closes_at {
            RoundPhase::Settling
        } else {
            RoundPhase::Closed
        }
    }
}

/// Public view of the live round: phase, timing, outcome once drawn.
/// Never exposes raw bet data.
#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub game_id: String,
    pub round_id: RoundId,
    pub period: String,
    pub phase: RoundPhase,
    pub opened_at: DateTime<Utc>,
    pub lock_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub betting_closes_in_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// A bet that exhausted its settlement retry budget. Surfaced as an
/// operational alert and tracked until resolved out of band, never
/// silently dropped and never silently paid.
#[derive(Debug, Clone, Serialize)]
pub struct EscalatedBet {
    pub bet: Bet,
    pub attempts: u32,
    pub last_error: String,
    pub escalated_at: DateTime<Utc>,
}

/// Cross-game registry of escalated bets.
pub struct EscalationRegistry {
    entries: Mutex<Vec<EscalatedBet>>,
}

impl EscalationRegistry {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    fn record(&self, escalation: EscalatedBet) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(escalation);
    }

    pub fn list(&self) -> Vec<EscalatedBet> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EscalationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedState {
    round: Round,
    fully_settled: bool,
    bets_settled: u32,
    total_payout: Amount,
}

struct PendingSettlement {
    bet: Bet,
    attempts: u32,
}

/// Drives one round per game instance through
/// OPEN -> LOCKED -> SETTLING -> CLOSED and recycles it.
pub struct RoundScheduler {
    rules: Arc<GameRuleSet>,
    ledger: BetLedger,
    generator: Arc<OutcomeGenerator>,
    balances: Arc<BalanceCache>,
    store: Arc<dyn BalanceStore>,
    history: RoundHistory,
    escalations: Arc<EscalationRegistry>,
    metrics: Arc<EngineMetrics>,
    shared: RwLock<SharedState>,
    /// Settlement work queue: drained bets plus per-bet retry state.
    unsettled: tokio::sync::Mutex<Vec<PendingSettlement>>,
    /// One-shot gate for outcome draw + ledger drain, reset on recycle.
    settle_gate: AtomicBool,
    /// One-shot gate for the history publish, reset on recycle.
    published: AtomicBool,
    commit_timeout: Duration,
    max_attempts: u32,
}

impl RoundScheduler {
    pub fn new(
        rules: Arc<GameRuleSet>,
        generator: Arc<OutcomeGenerator>,
        balances: Arc<BalanceCache>,
        store: Arc<dyn BalanceStore>,
        escalations: Arc<EscalationRegistry>,
        metrics: Arc<EngineMetrics>,
        now: DateTime<Utc>,
    ) -> Self {
        // Seed the id from the wall-clock bucket so ids keep increasing
        // across restarts.
        let first_id = now.timestamp().max(0) as u64 / rules.round_length_secs().max(1);
        let round = Round::open(&rules, first_id, now);
        let ledger = BetLedger::new(rules.max_bets_per_round_per_player);
        ledger.open_round(round.round_id);

        Self {
            rules,
            ledger,
            generator,
            balances,
            store,
            history: RoundHistory::new(HISTORY_CAPACITY),
            escalations,
            metrics,
            shared: RwLock::new(SharedState {
                round,
                fully_settled: false,
                bets_settled: 0,
                total_payout: 0,
            }),
            unsettled: tokio::sync::Mutex::new(Vec::new()),
            settle_gate: AtomicBool::new(false),
            published: AtomicBool::new(false),
            commit_timeout: COMMIT_TIMEOUT,
            max_attempts: MAX_SETTLE_ATTEMPTS,
        }
    }

    pub fn rules(&self) -> &GameRuleSet {
        &self.rules
    }

    /// Place a bet against the currently open round.
    ///
    /// Performs only in-memory checks plus an asynchronous stake commit;
    /// never blocks on network or timers.
    pub fn place_bet(
        &self,
        player_id: &str,
        selection: BetSelection,
        stake: Amount,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Uuid, PlaceError> {
        let (round_id, lock_at, betting_open) = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            (
                shared.round.round_id,
                shared.round.lock_at,
                shared.round.outcome.is_none(),
            )
        };

        if !betting_open || now >= lock_at {
            return Err(self.reject(PlaceError::RoundNotOpen));
        }
        if let Err(err) = self.rules.validate_selection(&selection) {
            return Err(self.reject(err));
        }
        if let Err(err) = self.rules.validate_stake(stake, quantity) {
            return Err(self.reject(err));
        }

        let bet = Bet {
            id: Uuid::new_v4(),
            player_id: player_id.to_string(),
            game_id: self.rules.game_id.clone(),
            round_id,
            selection,
            stake,
            quantity,
            placed_at: now,
        };
        let cost = bet.cost();

        if let Err(err) = self.balances.try_debit(player_id, cost) {
            return Err(self.reject(err));
        }
        if let Err(err) = self.ledger.place(bet.clone()) {
            // Drain won the race; hand the optimistic debit back.
            self.balances.apply(player_id, cost as i64);
            return Err(self.reject(err));
        }

        self.commit_stake_async(&bet);
        self.metrics
            .bets_accepted
            .with_label_values(&[self.rules.game_id.as_str()])
            .inc();
        Ok(bet.id)
    }

    fn reject(&self, err: PlaceError) -> PlaceError {
        self.metrics.bets_rejected.with_label_values(&[err.code()]).inc();
        err
    }

    /// Commit the stake debit to the authoritative store off the placement
    /// path. The idempotency key makes a redundant commit harmless; a
    /// failure here is surfaced by reconciliation, not by rolling back the
    /// optimistic debit.
    fn commit_stake_async(&self, bet: &Bet) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let player_id = bet.player_id.clone();
        let key = format!("{}:{}:{}:stake", bet.round_id, player_id, bet.id);
        let debit = -(bet.cost() as i64);
        handle.spawn(async move {
            if let Err(err) = store.commit_delta(&player_id, debit, &key).await {
                tracing::warn!(player = %player_id, key = %key, "stake commit failed: {}", err);
            }
        });
    }

    /// Advance the phase machine if due. Idempotent within an instant.
    pub async fn tick(&self, now: DateTime<Utc>) {
        self.maybe_enter_settling(now).await;
        self.run_settlement().await;
        self.maybe_publish(now);
        self.maybe_recycle(now);
    }

    /// Cross the lock boundary at most once per round: draw the outcome,
    /// then drain the ledger. The drain is the point at which this round's
    /// bets become final.
    async fn maybe_enter_settling(&self, now: DateTime<Utc>) {
        let due = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            shared.round.outcome.is_none() && now >= shared.round.lock_at
        };
        if !due || self.settle_gate.swap(true, Ordering::AcqRel) {
            return;
        }

        let round_id = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            shared.round.round_id
        };
        let outcome = self.generator.draw(&self.rules.domain);
        let bets = self.ledger.drain(round_id);
        tracing::debug!(
            game = %self.rules.game_id,
            round = round_id,
            bets = bets.len(),
            "outcome drawn, settling"
        );

        {
            let mut shared = self.shared.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            shared.round.outcome = Some(outcome);
            shared.fully_settled = bets.is_empty();
        }

        let mut queue = self.unsettled.lock().await;
        queue.extend(bets.into_iter().map(|bet| PendingSettlement { bet, attempts: 0 }));
    }

    /// Work the settlement queue. Every queued bet settles against the same
    /// drawn outcome; order across bets is irrelevant because settlement is
    /// a pure function of (bet, outcome). Failed bets are retried
    /// independently on later ticks until their budget runs out.
    async fn run_settlement(&self) {
        let outcome = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            shared.round.outcome.clone()
        };
        let Some(outcome) = outcome else { return };

        let mut queue = self.unsettled.lock().await;
        if queue.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut *queue);

        let mut still_pending = Vec::new();
        let mut settled: u32 = 0;
        let mut payout_sum: Amount = 0;

        for mut item in pending {
            match self.settle_one(&item.bet, &outcome).await {
                Ok(result) => {
                    settled += 1;
                    payout_sum = payout_sum.saturating_add(result.payout);
                }
                Err(err) => {
                    item.attempts += 1;
                    if item.attempts >= self.max_attempts {
                        tracing::error!(
                            game = %self.rules.game_id,
                            bet = %item.bet.id,
                            player = %item.bet.player_id,
                            attempts = item.attempts,
                            "settlement exhausted retries, escalating: {}",
                            err
                        );
                        self.metrics.settlement_escalations.inc();
                        self.escalations.record(EscalatedBet {
                            bet: item.bet,
                            attempts: item.attempts,
                            last_error: err.to_string(),
                            escalated_at: Utc::now(),
                        });
                    } else {
                        tracing::warn!(
                            game = %self.rules.game_id,
                            bet = %item.bet.id,
                            attempt = item.attempts,
                            "settlement failed, will retry: {}",
                            err
                        );
                        self.metrics.settlement_retries.inc();
                        still_pending.push(item);
                    }
                }
            }
        }

        let done = still_pending.is_empty();
        *queue = still_pending;
        drop(queue);

        let mut shared = self.shared.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        shared.bets_settled += settled;
        shared.total_payout = shared.total_payout.saturating_add(payout_sum);
        if done {
            shared.fully_settled = true;
        }
    }

    /// Settle a single bet: pure payout decision, then a bounded
    /// authoritative credit, then the optimistic cache credit. The
    /// idempotency key makes a commit retry after a timeout safe.
    async fn settle_one(
        &self,
        bet: &Bet,
        outcome: &Outcome,
    ) -> Result<SettlementResult, SettlementError> {
        let result = payout::settle(bet, outcome, &self.rules)?;

        if result.payout > 0 {
            let key = format!("{}:{}:{}:payout", bet.round_id, bet.player_id, bet.id);
            let commit = self
                .store
                .commit_delta(&bet.player_id, result.payout as i64, &key);
            match tokio::time::timeout(self.commit_timeout, commit).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(SettlementError::Commit(err.to_string())),
                Err(_) => return Err(SettlementError::CommitTimeout),
            }
            self.balances.apply(&bet.player_id, result.payout as i64);
            self.metrics
                .payouts_total
                .with_label_values(&[self.rules.game_id.as_str()])
                .inc_by(result.payout);
        }

        Ok(result)
    }

    /// Publish the closed round to the history feed, once.
    fn maybe_publish(&self, now: DateTime<Utc>) {
        let record = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            let round = &shared.round;
            if !shared.fully_settled || now < round.closes_at {
                return;
            }
            let Some(outcome) = round.outcome.clone() else {
                return;
            };
            ClosedRound {
                game_id: self.rules.game_id.clone(),
                round_id: round.round_id,
                period: period_label(round.opened_at),
                outcome,
                closed_at: now,
                result_display_until: round.result_display_until,
                bets_settled: shared.bets_settled,
                total_payout: shared.total_payout,
            }
        };

        if self.published.swap(true, Ordering::AcqRel) {
            return;
        }
        self.metrics
            .rounds_settled
            .with_label_values(&[self.rules.game_id.as_str()])
            .inc();
        tracing::debug!(
            game = %self.rules.game_id,
            round = record.round_id,
            payout = record.total_payout,
            "round closed"
        );
        self.history.publish(record);
    }

    /// After the result display window, archive the round and open the next
    /// one with the next id.
    fn maybe_recycle(&self, now: DateTime<Utc>) {
        let mut shared = self.shared.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let done = shared.round.outcome.is_some()
            && shared.fully_settled
            && self.published.load(Ordering::Acquire)
            && now >= shared.round.result_display_until;
        if !done {
            return;
        }

        let next_id = shared.round.round_id + 1;
        let round = Round::open(&self.rules, next_id, now);
        self.ledger.open_round(next_id);
        *shared = SharedState {
            round,
            fully_settled: false,
            bets_settled: 0,
            total_payout: 0,
        };
        self.settle_gate.store(false, Ordering::Release);
        self.published.store(false, Ordering::Release);
        tracing::debug!(game = %self.rules.game_id, round = next_id, "round opened");
    }

    /// Public snapshot of the live round.
    pub fn current_round(&self, now: DateTime<Utc>) -> RoundView {
        let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let round = &shared.round;
        RoundView {
            game_id: self.rules.game_id.clone(),
            round_id: round.round_id,
            period: period_label(round.opened_at),
            phase: round.phase(now, shared.fully_settled),
            opened_at: round.opened_at,
            lock_at: round.lock_at,
            closes_at: round.closes_at,
            betting_closes_in_ms: (round.lock_at - now).num_milliseconds().max(0),
            outcome: round.outcome.clone(),
        }
    }

    /// Most recent closed rounds, newest first.
    pub fn recent_rounds(&self, limit: usize) -> Vec<ClosedRound> {
        self.history.recent(limit)
    }

    /// Number of bets held against the live round.
    pub fn open_bet_count(&self) -> usize {
        let round_id = {
            let shared = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            shared.round.round_id
        };
        self.ledger.bet_count(round_id)
    }
}

fn period_label(opened_at: DateTime<Utc>) -> String {
    opened_at.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::InMemoryBalanceStore;
    use crate::config::RuleBook;
    use crate::errors::StoreError;
    use crate::games::types::{lottery_color, lottery_size, LotteryColor};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    fn secs(s: i64) -> ChronoDuration {
        ChronoDuration::seconds(s)
    }

    struct Harness {
        scheduler: RoundScheduler,
        store: Arc<InMemoryBalanceStore>,
        balances: Arc<BalanceCache>,
        escalations: Arc<EscalationRegistry>,
    }

    fn harness(game_id: &str, seed: u64) -> Harness {
        let store = Arc::new(InMemoryBalanceStore::new());
        harness_with_store(game_id, seed, store.clone(), store)
    }

    fn harness_with_store(
        game_id: &str,
        seed: u64,
        store: Arc<dyn BalanceStore>,
        raw: Arc<InMemoryBalanceStore>,
    ) -> Harness {
        let metrics = Arc::new(EngineMetrics::new());
        let balances = Arc::new(BalanceCache::new(store.clone(), metrics.clone()));
        let escalations = Arc::new(EscalationRegistry::new());
        let rules = RuleBook::builtin().get(game_id).unwrap();
        let scheduler = RoundScheduler::new(
            rules,
            Arc::new(OutcomeGenerator::seeded(seed)),
            balances.clone(),
            store,
            escalations.clone(),
            metrics,
            now0(),
        );
        Harness { scheduler, store: raw, balances, escalations }
    }

    fn fund(h: &Harness, player: &str, amount: Amount) {
        h.store.set_balance(player, amount);
        h.balances.apply(player, amount as i64);
    }

    #[tokio::test]
    async fn test_full_round_lifecycle() {
        let h = harness("lottery-30s", 42);
        fund(&h, "p1", 10_000);

        let t0 = now0();
        let view = h.scheduler.current_round(t0);
        assert_eq!(view.phase, RoundPhase::Open);
        assert!(view.outcome.is_none());
        let first_round = view.round_id;

        // Predict the draw with an identically seeded generator.
        let expected = OutcomeGenerator::seeded(42).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number: winning } = expected.clone() else {
            panic!("lottery domain")
        };

        h.scheduler
            .place_bet("p1", BetSelection::Number { number: winning }, 100, 1, t0 + secs(2))
            .unwrap();
        assert_eq!(h.scheduler.open_bet_count(), 1);

        // lock_at = opened + 30 - 5 = t0+25s; betting closed from there.
        let late = h
            .scheduler
            .place_bet("p1", BetSelection::Number { number: 3 }, 100, 1, t0 + secs(25));
        assert_eq!(late, Err(PlaceError::RoundNotOpen));

        // Tick past the lock boundary: draw + settle.
        h.scheduler.tick(t0 + secs(26)).await;
        let view = h.scheduler.current_round(t0 + secs(26));
        assert_eq!(view.phase, RoundPhase::Settling);
        assert_eq!(view.outcome, Some(expected.clone()));

        // Winning number bet pays 9x: 10_000 - 100 + 900.
        assert_eq!(h.balances.get("p1"), 10_800);

        // closes_at = t0 + 33s -> CLOSED and published.
        h.scheduler.tick(t0 + secs(33)).await;
        let view = h.scheduler.current_round(t0 + secs(33));
        assert_eq!(view.phase, RoundPhase::Closed);
        let history = h.scheduler.recent_rounds(5);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].round_id, first_round);
        assert_eq!(history[0].bets_settled, 1);

        // result_display_until = t0 + 40s -> recycled with the next id.
        h.scheduler.tick(t0 + secs(40)).await;
        let view = h.scheduler.current_round(t0 + secs(40));
        assert_eq!(view.round_id, first_round + 1);
        assert_eq!(view.phase, RoundPhase::Open);
        assert!(view.outcome.is_none());
    }

    #[tokio::test]
    async fn test_redundant_ticks_settle_exactly_once() {
        let h = harness("lottery-30s", 9);
        fund(&h, "p1", 1_000);

        let t0 = now0();
        let expected = OutcomeGenerator::seeded(9).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number: winning } = expected else { panic!("lottery domain") };

        h.scheduler
            .place_bet("p1", BetSelection::Number { number: winning }, 100, 1, t0 + secs(1))
            .unwrap();

        for _ in 0..10 {
            h.scheduler.tick(t0 + secs(26)).await;
        }

        // One draw, one settlement: exactly one 9x credit.
        assert_eq!(h.balances.get("p1"), 1_800);
        // Let the spawned stake commit land before reading the store.
        tokio::task::yield_now().await;
        assert_eq!(h.store.fetch_balance("p1").await.unwrap(), 1_800);
    }

    #[tokio::test]
    async fn test_losing_bets_pay_nothing() {
        let h = harness("lottery-30s", 4);
        fund(&h, "p1", 1_000);

        let t0 = now0();
        let expected = OutcomeGenerator::seeded(4).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number: winning } = expected else { panic!("lottery domain") };
        let losing = (winning + 1) % 10;

        h.scheduler
            .place_bet("p1", BetSelection::Number { number: losing }, 100, 1, t0 + secs(1))
            .unwrap();
        h.scheduler.tick(t0 + secs(26)).await;

        assert_eq!(h.balances.get("p1"), 900);
    }

    #[tokio::test]
    async fn test_derived_views_settle_consistently() {
        // Color and size bets matching the drawn digit's derivations must
        // both win alongside the digit itself.
        let h = harness("lottery-30s", 21);
        fund(&h, "p1", 10_000);

        let t0 = now0();
        let expected = OutcomeGenerator::seeded(21).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number } = expected else { panic!("lottery domain") };

        h.scheduler
            .place_bet(
                "p1",
                BetSelection::Color { color: lottery_color(number) },
                100,
                1,
                t0 + secs(1),
            )
            .unwrap();
        h.scheduler
            .place_bet(
                "p1",
                BetSelection::Size { size: lottery_size(number) },
                100,
                1,
                t0 + secs(1),
            )
            .unwrap();
        h.scheduler.tick(t0 + secs(26)).await;

        // Size pays 2x either way; color pays 4.5x only on violet digits.
        let color_payout = if lottery_color(number) == LotteryColor::Violet { 450 } else { 200 };
        let expected_balance = 10_000 - 200 + color_payout + 200;
        assert_eq!(h.balances.get("p1"), expected_balance);
    }

    /// Store whose commits always fail; fetches succeed.
    struct BrokenCommitStore {
        inner: InMemoryBalanceStore,
    }

    #[async_trait]
    impl BalanceStore for BrokenCommitStore {
        async fn fetch_balance(&self, player_id: &str) -> Result<Amount, StoreError> {
            self.inner.fetch_balance(player_id).await
        }

        async fn commit_delta(
            &self,
            _player_id: &str,
            _delta: i64,
            _idempotency_key: &str,
        ) -> Result<Amount, StoreError> {
            Err(StoreError::Unavailable("commit channel down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_escalate_and_round_closes() {
        let raw = Arc::new(InMemoryBalanceStore::new());
        let broken = Arc::new(BrokenCommitStore { inner: InMemoryBalanceStore::new() });
        let h = harness_with_store("lottery-30s", 42, broken, raw);
        h.balances.apply("p1", 10_000);

        let t0 = now0();
        let expected = OutcomeGenerator::seeded(42).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number: winning } = expected else { panic!("lottery domain") };

        h.scheduler
            .place_bet("p1", BetSelection::Number { number: winning }, 100, 1, t0 + secs(1))
            .unwrap();

        // Each tick consumes one retry attempt for the failing commit.
        for i in 0..MAX_SETTLE_ATTEMPTS {
            h.scheduler.tick(t0 + secs(26 + i as i64)).await;
        }

        assert_eq!(h.escalations.len(), 1);
        let escalated = &h.escalations.list()[0];
        assert_eq!(escalated.attempts, MAX_SETTLE_ATTEMPTS);
        assert!(escalated.last_error.contains("commit"));

        // The round still closes for presentation purposes.
        h.scheduler.tick(t0 + secs(33)).await;
        assert_eq!(
            h.scheduler.current_round(t0 + secs(33)).phase,
            RoundPhase::Closed
        );
        // The winning credit was never applied.
        assert_eq!(h.balances.get("p1"), 9_900);
    }

    #[tokio::test]
    async fn test_round_does_not_close_while_retries_remain() {
        let raw = Arc::new(InMemoryBalanceStore::new());
        let broken = Arc::new(BrokenCommitStore { inner: InMemoryBalanceStore::new() });
        let h = harness_with_store("lottery-30s", 42, broken, raw);
        h.balances.apply("p1", 10_000);

        let t0 = now0();
        let expected = OutcomeGenerator::seeded(42).draw(&h.scheduler.rules().domain);
        let Outcome::Lottery { number: winning } = expected else { panic!("lottery domain") };

        h.scheduler
            .place_bet("p1", BetSelection::Number { number: winning }, 100, 1, t0 + secs(1))
            .unwrap();

        // First failure: bet remains unsettled, phase stays SETTLING even
        // past the nominal close time.
        h.scheduler.tick(t0 + secs(34)).await;
        assert_eq!(
            h.scheduler.current_round(t0 + secs(34)).phase,
            RoundPhase::Settling
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let h = harness("lottery-30s", 1);
        fund(&h, "p1", 150);

        let t0 = now0();
        let err = h
            .scheduler
            .place_bet("p1", BetSelection::Number { number: 1 }, 100, 2, t0 + secs(1))
            .unwrap_err();
        assert_eq!(err, PlaceError::InsufficientBalance);
        // Nothing was debited on the rejected path.
        assert_eq!(h.balances.get("p1"), 150);
    }

    #[tokio::test]
    async fn test_round_ids_strictly_increase() {
        let h = harness("lottery-30s", 2);
        let t0 = now0();
        let first = h.scheduler.current_round(t0).round_id;

        // Two empty rounds back to back.
        h.scheduler.tick(t0 + secs(26)).await;
        h.scheduler.tick(t0 + secs(40)).await;
        let second = h.scheduler.current_round(t0 + secs(40)).round_id;
        h.scheduler.tick(t0 + secs(66)).await;
        h.scheduler.tick(t0 + secs(80)).await;
        let third = h.scheduler.current_round(t0 + secs(80)).round_id;

        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_empty_round_publishes_outcome() {
        let h = harness("card-duel", 5);
        let t0 = now0();

        // card-duel: betting 20s, grace 5 -> lock at 15s, closes at 23s.
        h.scheduler.tick(t0 + secs(16)).await;
        h.scheduler.tick(t0 + secs(23)).await;

        let history = h.scheduler.recent_rounds(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].bets_settled, 0);
        assert!(matches!(history[0].outcome, Outcome::CardDuel { .. }));
    }
}
