//! Closed-round history: the read-only feed consumed by presentation.
//!
//! Bounded ring per game; no mutation path is exposed outward.

use crate::games::types::{Amount, Outcome, RoundId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// Published record of a settled round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedRound {
    pub game_id: String,
    pub round_id: RoundId,
    /// Human-readable period label derived from the round's opening time.
    pub period: String,
    pub outcome: Outcome,
    pub closed_at: DateTime<Utc>,
    pub result_display_until: DateTime<Utc>,
    pub bets_settled: u32,
    pub total_payout: Amount,
}

/// Ring buffer of the most recent closed rounds for one game.
pub struct RoundHistory {
    rounds: RwLock<VecDeque<ClosedRound>>,
    capacity: usize,
}

impl RoundHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            rounds: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Publish a closed round, evicting the oldest past capacity.
    pub fn publish(&self, record: ClosedRound) {
        let mut rounds = self.rounds.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if rounds.len() == self.capacity {
            rounds.pop_front();
        }
        rounds.push_back(record);
    }

    /// Most recent rounds, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ClosedRound> {
        let rounds = self.rounds.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rounds.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rounds
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(round_id: RoundId) -> ClosedRound {
        ClosedRound {
            game_id: "lottery-30s".to_string(),
            round_id,
            period: format!("202608060000-{}", round_id),
            outcome: Outcome::Lottery { number: (round_id % 10) as u8 },
            closed_at: Utc::now(),
            result_display_until: Utc::now(),
            bets_settled: 0,
            total_payout: 0,
        }
    }

    #[test]
    fn test_publish_and_recent_order() {
        let history = RoundHistory::new(10);
        for id in 1..=5 {
            history.publish(record(id));
        }

        let recent = history.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].round_id, 5);
        assert_eq!(recent[2].round_id, 3);
    }

    #[test]
    fn test_capacity_eviction() {
        let history = RoundHistory::new(3);
        for id in 1..=5 {
            history.publish(record(id));
        }

        assert_eq!(history.len(), 3);
        let recent = history.recent(10);
        assert_eq!(recent.first().unwrap().round_id, 5);
        assert_eq!(recent.last().unwrap().round_id, 3);
    }
}
