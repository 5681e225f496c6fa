//! Game rule sets: versioned, reviewable per-game configuration.
//!
//! All game-specific knowledge (phase durations, allowed bet kinds, payout
//! multipliers, outcome domain parameters, stake limits) lives here as
//! data. Adding a new game of an existing family is a rules change, not a
//! code change.

use crate::errors::{ConfigError, PlaceError};
use crate::games::types::{Amount, BetSelection, CashOut, GameFamily};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Minimum declarable threshold/auto-cash-out target.
pub const MIN_TARGET_MULTIPLIER: f64 = 1.01;

/// Payout multiplier table: bet-kind key -> multiplier.
///
/// Multipliers must be non-negative; the house edge is encoded implicitly by
/// win probability vs multiplier and is never validated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PayoutTable(BTreeMap<String, f64>);

impl PayoutTable {
    pub fn get(&self, kind: &str) -> Option<f64> {
        self.0.get(kind).copied()
    }

    pub fn insert(&mut self, kind: &str, multiplier: f64) {
        self.0.insert(kind.to_string(), multiplier);
    }

    fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let mut table = Self::default();
        for (kind, multiplier) in pairs {
            table.insert(kind, *multiplier);
        }
        table
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

/// Outcome domain parameters per game family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum OutcomeDomain {
    /// Single digit in 0..=9 with derived color/size views.
    Lottery,
    /// Crash multiplier >= 1.00. Half the mass is drawn uniformly from
    /// [1, breakpoint), half from [1, max_multiplier). The exact curve is
    /// a tunable game-economics parameter, not a correctness invariant.
    Crash { breakpoint: f64, max_multiplier: f64 },
    /// `mine_count` mines placed uniformly without replacement among
    /// `total_cells` cells.
    Grid { total_cells: u8, mine_count: u8 },
    /// Two independently drawn cards.
    CardDuel,
    /// Crash point drawn uniformly from [1, max_multiplier].
    Threshold { max_multiplier: f64 },
}

impl OutcomeDomain {
    pub fn family(&self) -> GameFamily {
        match self {
            OutcomeDomain::Lottery => GameFamily::Lottery,
            OutcomeDomain::Crash { .. } => GameFamily::Crash,
            OutcomeDomain::Grid { .. } => GameFamily::GridReveal,
            OutcomeDomain::CardDuel => GameFamily::CardDuel,
            OutcomeDomain::Threshold { .. } => GameFamily::Threshold,
        }
    }
}

/// Static configuration for one game type. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRuleSet {
    pub game_id: String,
    pub betting_window_secs: u64,
    pub drawing_window_secs: u64,
    pub result_display_secs: u64,
    /// Betting closes this many seconds before the betting window nominally
    /// ends, so last-instant bets cannot race the draw.
    #[serde(default = "default_lock_grace")]
    pub lock_grace_secs: u64,
    #[serde(default = "default_min_stake")]
    pub min_stake: Amount,
    #[serde(default = "default_max_stake")]
    pub max_stake: Amount,
    #[serde(default = "default_max_bets_per_player")]
    pub max_bets_per_round_per_player: u32,
    pub payout: PayoutTable,
    pub domain: OutcomeDomain,
}

fn default_lock_grace() -> u64 {
    5
}

fn default_min_stake() -> Amount {
    100
}

fn default_max_stake() -> Amount {
    10_000_000
}

fn default_max_bets_per_player() -> u32 {
    20
}

impl GameRuleSet {
    pub fn family(&self) -> GameFamily {
        self.domain.family()
    }

    /// Full round length: betting + drawing + result display.
    pub fn round_length_secs(&self) -> u64 {
        self.betting_window_secs
            .saturating_add(self.drawing_window_secs)
            .saturating_add(self.result_display_secs)
    }

    /// Validate internal consistency of the rule set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| ConfigError::InvalidRuleSet {
            game: self.game_id.clone(),
            reason,
        };

        if self.game_id.is_empty() {
            return Err(fail("game_id must not be empty".to_string()));
        }
        if self.betting_window_secs == 0 {
            return Err(fail("betting_window_secs must be > 0".to_string()));
        }
        if self.lock_grace_secs >= self.betting_window_secs {
            return Err(fail(format!(
                "lock_grace_secs ({}) must be shorter than betting_window_secs ({})",
                self.lock_grace_secs, self.betting_window_secs
            )));
        }
        if self.min_stake == 0 || self.min_stake > self.max_stake {
            return Err(fail("stake limits must satisfy 0 < min_stake <= max_stake".to_string()));
        }
        if self.max_bets_per_round_per_player == 0 {
            return Err(fail("max_bets_per_round_per_player must be > 0".to_string()));
        }

        for (kind, multiplier) in self.payout.iter() {
            if !multiplier.is_finite() || *multiplier < 0.0 {
                return Err(fail(format!("multiplier for '{}' must be >= 0", kind)));
            }
        }

        match &self.domain {
            OutcomeDomain::Lottery => {
                for kind in ["color", "violet", "number", "size"] {
                    if self.payout.get(kind).is_none() {
                        return Err(fail(format!("lottery payout table missing '{}'", kind)));
                    }
                }
            }
            OutcomeDomain::Crash { breakpoint, max_multiplier } => {
                if *breakpoint < 1.0 || *max_multiplier <= *breakpoint {
                    return Err(fail(
                        "crash curve requires 1.0 <= breakpoint < max_multiplier".to_string(),
                    ));
                }
            }
            OutcomeDomain::Grid { total_cells, mine_count } => {
                if *mine_count == 0 || mine_count >= total_cells {
                    return Err(fail(
                        "grid requires 0 < mine_count < total_cells".to_string(),
                    ));
                }
                if self.payout.get("house_edge_factor").map_or(true, |f| f <= 0.0 || f > 1.0) {
                    return Err(fail(
                        "grid payout table requires house_edge_factor in (0, 1]".to_string(),
                    ));
                }
            }
            OutcomeDomain::CardDuel => {
                for kind in ["side", "tie"] {
                    if self.payout.get(kind).is_none() {
                        return Err(fail(format!("card duel payout table missing '{}'", kind)));
                    }
                }
            }
            OutcomeDomain::Threshold { max_multiplier } => {
                if *max_multiplier < MIN_TARGET_MULTIPLIER {
                    return Err(fail(format!(
                        "threshold max_multiplier must be >= {}",
                        MIN_TARGET_MULTIPLIER
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check a bet selection against this game's bet taxonomy and domain.
    pub fn validate_selection(&self, selection: &BetSelection) -> Result<(), PlaceError> {
        if selection.family() != self.family() {
            return Err(PlaceError::InvalidBet(format!(
                "selection family {} does not match game family {}",
                selection.family(),
                self.family()
            )));
        }

        match (selection, &self.domain) {
            (BetSelection::Number { number }, _) if *number > 9 => Err(PlaceError::InvalidBet(
                format!("number {} out of range 0..=9", number),
            )),
            (BetSelection::Crash { cash_out }, _) => {
                let multiplier = cash_out.multiplier();
                if !multiplier.is_finite() || multiplier < 1.0 {
                    return Err(PlaceError::InvalidBet(format!(
                        "cash-out multiplier {} must be >= 1.0",
                        multiplier
                    )));
                }
                if let CashOut::Auto { target } = cash_out {
                    if *target < MIN_TARGET_MULTIPLIER {
                        return Err(PlaceError::InvalidBet(format!(
                            "auto cash-out target {} below minimum {}",
                            target, MIN_TARGET_MULTIPLIER
                        )));
                    }
                }
                Ok(())
            }
            (BetSelection::Grid { revealed }, OutcomeDomain::Grid { total_cells, mine_count }) => {
                let safe_cells = (total_cells - mine_count) as usize;
                if revealed.len() > safe_cells {
                    return Err(PlaceError::InvalidBet(format!(
                        "revealed {} cells but only {} can be safe",
                        revealed.len(),
                        safe_cells
                    )));
                }
                let mut seen = [false; 256];
                for cell in revealed {
                    if *cell >= *total_cells {
                        return Err(PlaceError::InvalidBet(format!(
                            "cell {} out of range 0..{}",
                            cell, total_cells
                        )));
                    }
                    if seen[*cell as usize] {
                        return Err(PlaceError::InvalidBet(format!("cell {} revealed twice", cell)));
                    }
                    seen[*cell as usize] = true;
                }
                Ok(())
            }
            (BetSelection::Threshold { target }, OutcomeDomain::Threshold { max_multiplier }) => {
                if !target.is_finite()
                    || *target < MIN_TARGET_MULTIPLIER
                    || *target > *max_multiplier
                {
                    return Err(PlaceError::InvalidBet(format!(
                        "target {} outside [{}, {}]",
                        target, MIN_TARGET_MULTIPLIER, max_multiplier
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Check stake and quantity against this game's limits.
    pub fn validate_stake(&self, stake: Amount, quantity: u32) -> Result<(), PlaceError> {
        if quantity == 0 {
            return Err(PlaceError::InvalidBet("quantity must be positive".to_string()));
        }
        if stake < self.min_stake || stake > self.max_stake {
            return Err(PlaceError::InvalidBet(format!(
                "stake {} outside limits [{}, {}]",
                stake, self.min_stake, self.max_stake
            )));
        }
        Ok(())
    }
}

/// On-disk rule file layout.
#[derive(Debug, Serialize, Deserialize)]
struct RuleFile {
    version: u32,
    games: Vec<GameRuleSet>,
}

/// The validated collection of rule sets the engine runs with.
#[derive(Debug, Clone)]
pub struct RuleBook {
    version: u32,
    games: HashMap<String, Arc<GameRuleSet>>,
}

impl RuleBook {
    /// Load and validate a rule file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: RuleFile = toml::from_str(&raw)?;
        Self::from_rule_sets(file.version, file.games)
    }

    /// Build a rule book from in-memory rule sets, validating each.
    pub fn from_rule_sets(
        version: u32,
        rule_sets: Vec<GameRuleSet>,
    ) -> Result<Self, ConfigError> {
        let mut games = HashMap::with_capacity(rule_sets.len());
        for rules in rule_sets {
            rules.validate()?;
            let game_id = rules.game_id.clone();
            if games.insert(game_id.clone(), Arc::new(rules)).is_some() {
                return Err(ConfigError::DuplicateGame(game_id));
            }
        }
        Ok(Self { version, games })
    }

    /// Built-in rule sets for the five shipped games.
    pub fn builtin() -> Self {
        let games = vec![
            GameRuleSet {
                game_id: "lottery-30s".to_string(),
                betting_window_secs: 30,
                drawing_window_secs: 3,
                result_display_secs: 7,
                lock_grace_secs: 5,
                min_stake: default_min_stake(),
                max_stake: default_max_stake(),
                max_bets_per_round_per_player: default_max_bets_per_player(),
                payout: PayoutTable::from_pairs(&[
                    ("color", 2.0),
                    ("violet", 4.5),
                    ("number", 9.0),
                    ("size", 2.0),
                ]),
                domain: OutcomeDomain::Lottery,
            },
            GameRuleSet {
                game_id: "crash".to_string(),
                betting_window_secs: 15,
                drawing_window_secs: 20,
                result_display_secs: 5,
                lock_grace_secs: 3,
                min_stake: default_min_stake(),
                max_stake: default_max_stake(),
                max_bets_per_round_per_player: 1,
                payout: PayoutTable::default(),
                domain: OutcomeDomain::Crash { breakpoint: 3.0, max_multiplier: 11.0 },
            },
            GameRuleSet {
                game_id: "grid-reveal".to_string(),
                betting_window_secs: 45,
                drawing_window_secs: 2,
                result_display_secs: 8,
                lock_grace_secs: 5,
                min_stake: default_min_stake(),
                max_stake: default_max_stake(),
                max_bets_per_round_per_player: 1,
                payout: PayoutTable::from_pairs(&[("house_edge_factor", 0.97)]),
                domain: OutcomeDomain::Grid { total_cells: 25, mine_count: 3 },
            },
            GameRuleSet {
                game_id: "card-duel".to_string(),
                betting_window_secs: 20,
                drawing_window_secs: 3,
                result_display_secs: 7,
                lock_grace_secs: 5,
                min_stake: default_min_stake(),
                max_stake: default_max_stake(),
                max_bets_per_round_per_player: default_max_bets_per_player(),
                payout: PayoutTable::from_pairs(&[("side", 2.0), ("tie", 8.0)]),
                domain: OutcomeDomain::CardDuel,
            },
            GameRuleSet {
                game_id: "threshold-multiplier".to_string(),
                betting_window_secs: 20,
                drawing_window_secs: 2,
                result_display_secs: 6,
                lock_grace_secs: 4,
                min_stake: default_min_stake(),
                max_stake: default_max_stake(),
                max_bets_per_round_per_player: 5,
                payout: PayoutTable::default(),
                domain: OutcomeDomain::Threshold { max_multiplier: 100.0 },
            },
        ];

        Self::from_rule_sets(1, games).expect("builtin rule sets must validate")
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, game_id: &str) -> Option<Arc<GameRuleSet>> {
        self.games.get(game_id).cloned()
    }

    pub fn game_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.games.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<GameRuleSet>> {
        self.games.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::LotteryColor;
    use std::io::Write;

    #[test]
    fn test_builtin_rule_book_validates() {
        let book = RuleBook::builtin();
        assert_eq!(book.game_ids().len(), 5);
        assert!(book.get("lottery-30s").is_some());
        assert!(book.get("roulette").is_none());
    }

    #[test]
    fn test_lock_grace_must_fit_betting_window() {
        let mut rules = (*RuleBook::builtin().get("lottery-30s").unwrap()).clone();
        rules.lock_grace_secs = rules.betting_window_secs;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_missing_payout_key_rejected() {
        let mut rules = (*RuleBook::builtin().get("card-duel").unwrap()).clone();
        rules.payout = PayoutTable::default();
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_grid_domain_bounds() {
        let mut rules = (*RuleBook::builtin().get("grid-reveal").unwrap()).clone();
        rules.domain = OutcomeDomain::Grid { total_cells: 25, mine_count: 25 };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_selection_family_mismatch_rejected() {
        let book = RuleBook::builtin();
        let crash = book.get("crash").unwrap();
        let err = crash
            .validate_selection(&BetSelection::Color { color: LotteryColor::Red })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_BET_KIND");
    }

    #[test]
    fn test_number_out_of_range_rejected() {
        let book = RuleBook::builtin();
        let lottery = book.get("lottery-30s").unwrap();
        assert!(lottery.validate_selection(&BetSelection::Number { number: 9 }).is_ok());
        assert!(lottery.validate_selection(&BetSelection::Number { number: 10 }).is_err());
    }

    #[test]
    fn test_grid_selection_duplicate_cell_rejected() {
        let book = RuleBook::builtin();
        let grid = book.get("grid-reveal").unwrap();
        assert!(grid.validate_selection(&BetSelection::Grid { revealed: vec![1, 2, 3] }).is_ok());
        assert!(grid.validate_selection(&BetSelection::Grid { revealed: vec![1, 1] }).is_err());
        assert!(grid.validate_selection(&BetSelection::Grid { revealed: vec![25] }).is_err());
    }

    #[test]
    fn test_threshold_target_bounds() {
        let book = RuleBook::builtin();
        let threshold = book.get("threshold-multiplier").unwrap();
        assert!(threshold.validate_selection(&BetSelection::Threshold { target: 1.5 }).is_ok());
        assert!(threshold.validate_selection(&BetSelection::Threshold { target: 1.0 }).is_err());
        assert!(threshold.validate_selection(&BetSelection::Threshold { target: 101.0 }).is_err());
    }

    #[test]
    fn test_stake_limits() {
        let book = RuleBook::builtin();
        let lottery = book.get("lottery-30s").unwrap();
        assert!(lottery.validate_stake(100, 1).is_ok());
        assert!(lottery.validate_stake(99, 1).is_err());
        assert!(lottery.validate_stake(100, 0).is_err());
    }

    #[test]
    fn test_rule_file_round_trip() {
        let toml_src = r#"
version = 3

[[games]]
game_id = "lottery-60s"
betting_window_secs = 55
drawing_window_secs = 3
result_display_secs = 7

[games.payout]
color = 2.0
violet = 4.5
number = 9.0
size = 2.0

[games.domain]
family = "lottery"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_src.as_bytes()).unwrap();

        let book = RuleBook::from_file(file.path()).unwrap();
        assert_eq!(book.version(), 3);
        let rules = book.get("lottery-60s").unwrap();
        assert_eq!(rules.betting_window_secs, 55);
        // Defaults fill in the omitted fields.
        assert_eq!(rules.lock_grace_secs, 5);
        assert_eq!(rules.min_stake, 100);
    }

    #[test]
    fn test_duplicate_game_id_rejected() {
        let rules = (*RuleBook::builtin().get("crash").unwrap()).clone();
        let result = RuleBook::from_rule_sets(1, vec![rules.clone(), rules]);
        assert!(matches!(result, Err(ConfigError::DuplicateGame(_))));
    }
}
