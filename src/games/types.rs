use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Monetary amount in minor units (cents).
pub type Amount = u64;

/// Monotonically increasing round identifier, unique per game instance.
pub type RoundId = u64;

/// Game families supported by the engine.
///
/// A family fixes the outcome shape and the set of valid bet selections;
/// everything else (durations, payout table, domain parameters) comes from
/// the per-game rule set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameFamily {
    /// Digit lottery with derived color and size views.
    Lottery,
    /// Ascending-multiplier crash curve.
    Crash,
    /// Grid reveal with hidden mines.
    GridReveal,
    /// Two-card dragon/tiger comparison.
    CardDuel,
    /// Declared-target threshold multiplier.
    Threshold,
}

impl fmt::Display for GameFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameFamily::Lottery => write!(f, "lottery"),
            GameFamily::Crash => write!(f, "crash"),
            GameFamily::GridReveal => write!(f, "grid_reveal"),
            GameFamily::CardDuel => write!(f, "card_duel"),
            GameFamily::Threshold => write!(f, "threshold"),
        }
    }
}

/// Lottery color derived from the drawn digit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LotteryColor {
    Red,
    Green,
    Violet,
}

/// Lottery size derived from the drawn digit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LotterySize {
    Big,
    Small,
}

/// Color view of a lottery digit. Pure function of the digit; never stored
/// independently so the number/color/size views cannot diverge.
pub fn lottery_color(number: u8) -> LotteryColor {
    match number {
        0 | 5 => LotteryColor::Violet,
        1 | 3 | 7 | 9 => LotteryColor::Green,
        _ => LotteryColor::Red,
    }
}

/// Size view of a lottery digit (big iff >= 5).
pub fn lottery_size(number: u8) -> LotterySize {
    if number >= 5 {
        LotterySize::Big
    } else {
        LotterySize::Small
    }
}

/// Side of a card duel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DuelSide {
    Dragon,
    Tiger,
    Tie,
}

impl fmt::Display for DuelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuelSide::Dragon => write!(f, "dragon"),
            DuelSide::Tiger => write!(f, "tiger"),
            DuelSide::Tie => write!(f, "tie"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardSuit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

/// A playing card. `rank` is 1..=13 (A=1, J/Q/K=11/12/13) and doubles as
/// the comparison value in a duel; suit is presentation-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub rank: u8,
    pub suit: CardSuit,
}

impl Card {
    pub fn value(&self) -> u8 {
        self.rank
    }
}

/// How a crash bet left the curve.
///
/// `Auto` is the target declared at placement; `Manual` is the multiplier at
/// which the player's cash-out request was observed. Either way the value is
/// final once the bet reaches the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CashOut {
    Auto { target: f64 },
    Manual { observed: f64 },
}

impl CashOut {
    /// The multiplier the payout is computed from.
    pub fn multiplier(&self) -> f64 {
        match self {
            CashOut::Auto { target } => *target,
            CashOut::Manual { observed } => *observed,
        }
    }
}

/// A bet selection: one closed variant per allowed bet kind.
///
/// Validated against the game's rule set at placement, so a selection held
/// by the ledger is always well-formed for its game family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetSelection {
    Color { color: LotteryColor },
    Number { number: u8 },
    Size { size: LotterySize },
    Crash { cash_out: CashOut },
    /// Ordered list of grid cells the player revealed before cashing out.
    Grid { revealed: Vec<u8> },
    Duel { side: DuelSide },
    Threshold { target: f64 },
}

impl BetSelection {
    /// The family this selection belongs to.
    pub fn family(&self) -> GameFamily {
        match self {
            BetSelection::Color { .. }
            | BetSelection::Number { .. }
            | BetSelection::Size { .. } => GameFamily::Lottery,
            BetSelection::Crash { .. } => GameFamily::Crash,
            BetSelection::Grid { .. } => GameFamily::GridReveal,
            BetSelection::Duel { .. } => GameFamily::CardDuel,
            BetSelection::Threshold { .. } => GameFamily::Threshold,
        }
    }
}

/// The outcome drawn for a round: one variant per game family.
///
/// Immutable once set on a round. Lottery color/size are derived views of
/// the stored digit, never stored themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Outcome {
    Lottery {
        number: u8,
    },
    Crash {
        multiplier: f64,
    },
    Grid {
        mines: Vec<u8>,
        total_cells: u8,
    },
    CardDuel {
        dragon: Card,
        tiger: Card,
    },
    Threshold {
        crash_point: f64,
    },
}

impl Outcome {
    pub fn family(&self) -> GameFamily {
        match self {
            Outcome::Lottery { .. } => GameFamily::Lottery,
            Outcome::Crash { .. } => GameFamily::Crash,
            Outcome::Grid { .. } => GameFamily::GridReveal,
            Outcome::CardDuel { .. } => GameFamily::CardDuel,
            Outcome::Threshold { .. } => GameFamily::Threshold,
        }
    }

    /// Winning side of a card duel outcome, `None` for other families.
    pub fn duel_winner(&self) -> Option<DuelSide> {
        match self {
            Outcome::CardDuel { dragon, tiger } => {
                Some(match dragon.value().cmp(&tiger.value()) {
                    std::cmp::Ordering::Greater => DuelSide::Dragon,
                    std::cmp::Ordering::Less => DuelSide::Tiger,
                    std::cmp::Ordering::Equal => DuelSide::Tie,
                })
            }
            _ => None,
        }
    }
}

/// A placed bet. Append-only: owned by the ledger until settlement and never
/// mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: Uuid,
    pub player_id: String,
    pub game_id: String,
    pub round_id: RoundId,
    pub selection: BetSelection,
    /// Stake per unit, in minor units.
    pub stake: Amount,
    /// Positive integer multiplier on the stake.
    pub quantity: u32,
    pub placed_at: DateTime<Utc>,
}

impl Bet {
    /// Total amount debited at placement.
    pub fn cost(&self) -> Amount {
        self.stake.saturating_mul(self.quantity as u64)
    }
}

/// The result of settling one bet against a round's outcome.
///
/// Produced exactly once per bet; consumed exactly once by the balance
/// cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementResult {
    pub bet_id: Uuid,
    pub player_id: String,
    pub round_id: RoundId,
    pub won: bool,
    /// Gross payout in minor units; 0 on a loss.
    pub payout: Amount,
    /// The amount already debited at placement, for audit.
    pub stake_debited: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_derivation_full_mapping() {
        for n in 0u8..10 {
            let color = lottery_color(n);
            match n {
                0 | 5 => assert_eq!(color, LotteryColor::Violet),
                1 | 3 | 7 | 9 => assert_eq!(color, LotteryColor::Green),
                _ => assert_eq!(color, LotteryColor::Red),
            }
        }
    }

    #[test]
    fn test_size_derivation() {
        for n in 0u8..5 {
            assert_eq!(lottery_size(n), LotterySize::Small);
        }
        for n in 5u8..10 {
            assert_eq!(lottery_size(n), LotterySize::Big);
        }
    }

    #[test]
    fn test_duel_winner() {
        let dragon = Card { rank: 12, suit: CardSuit::Clubs };
        let tiger = Card { rank: 3, suit: CardSuit::Hearts };
        let outcome = Outcome::CardDuel { dragon, tiger };
        assert_eq!(outcome.duel_winner(), Some(DuelSide::Dragon));

        let outcome = Outcome::CardDuel { dragon: tiger, tiger: dragon };
        assert_eq!(outcome.duel_winner(), Some(DuelSide::Tiger));

        let outcome = Outcome::CardDuel {
            dragon: Card { rank: 7, suit: CardSuit::Spades },
            tiger: Card { rank: 7, suit: CardSuit::Diamonds },
        };
        assert_eq!(outcome.duel_winner(), Some(DuelSide::Tie));
    }

    #[test]
    fn test_bet_cost_saturates() {
        let bet = Bet {
            id: Uuid::new_v4(),
            player_id: "p1".to_string(),
            game_id: "lottery-30s".to_string(),
            round_id: 1,
            selection: BetSelection::Number { number: 7 },
            stake: u64::MAX,
            quantity: 3,
            placed_at: Utc::now(),
        };
        assert_eq!(bet.cost(), u64::MAX);
    }

    #[test]
    fn test_selection_family() {
        assert_eq!(
            BetSelection::Color { color: LotteryColor::Red }.family(),
            GameFamily::Lottery
        );
        assert_eq!(
            BetSelection::Crash { cash_out: CashOut::Auto { target: 2.0 } }.family(),
            GameFamily::Crash
        );
        assert_eq!(
            BetSelection::Grid { revealed: vec![0, 1, 2] }.family(),
            GameFamily::GridReveal
        );
    }

    #[test]
    fn test_selection_serde_tagging() {
        let sel = BetSelection::Number { number: 7 };
        let json = serde_json::to_string(&sel).unwrap();
        assert!(json.contains("\"kind\":\"number\""));
        let back: BetSelection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sel);
    }
}
