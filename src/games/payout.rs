//! Payout settlement: pure win/lose decision per (bet, outcome) pair.
//!
//! `settle` has no side effects and is deterministic for identical inputs,
//! which makes redundant invocations during settlement retries safe and
//! keeps results auditable. Payouts are computed from the stake recorded on
//! the bet at placement time, never from a live balance.

use crate::config::GameRuleSet;
use crate::errors::SettlementError;
use crate::games::types::{
    lottery_color, lottery_size, Amount, Bet, BetSelection, DuelSide, Outcome, SettlementResult,
};

/// Settle one bet against a round's outcome.
pub fn settle(
    bet: &Bet,
    outcome: &Outcome,
    rules: &GameRuleSet,
) -> Result<SettlementResult, SettlementError> {
    let multiplier = win_multiplier(&bet.selection, outcome, rules)?;
    let payout = match multiplier {
        Some(m) => scale_payout(bet.cost(), m),
        None => 0,
    };

    Ok(SettlementResult {
        bet_id: bet.id,
        player_id: bet.player_id.clone(),
        round_id: bet.round_id,
        won: multiplier.is_some(),
        payout,
        stake_debited: bet.cost(),
    })
}

/// Apply a multiplier to a wagered amount, rounding to whole minor units
/// only at this boundary.
fn scale_payout(wagered: Amount, multiplier: f64) -> Amount {
    (wagered as f64 * multiplier).round() as Amount
}

/// The winning multiplier for a selection, or `None` on a loss.
fn win_multiplier(
    selection: &BetSelection,
    outcome: &Outcome,
    rules: &GameRuleSet,
) -> Result<Option<f64>, SettlementError> {
    let table_multiplier = |kind: &str| {
        rules
            .payout
            .get(kind)
            .ok_or_else(|| SettlementError::Payout(format!("payout table missing '{}'", kind)))
    };

    match (selection, outcome) {
        (BetSelection::Color { color }, Outcome::Lottery { number }) => {
            if lottery_color(*number) != *color {
                return Ok(None);
            }
            let kind = match color {
                crate::games::types::LotteryColor::Violet => "violet",
                _ => "color",
            };
            Ok(Some(table_multiplier(kind)?))
        }
        (BetSelection::Number { number: picked }, Outcome::Lottery { number }) => {
            if picked == number {
                Ok(Some(table_multiplier("number")?))
            } else {
                Ok(None)
            }
        }
        (BetSelection::Size { size }, Outcome::Lottery { number }) => {
            if lottery_size(*number) == *size {
                Ok(Some(table_multiplier("size")?))
            } else {
                Ok(None)
            }
        }
        (BetSelection::Crash { cash_out }, Outcome::Crash { multiplier }) => {
            // Cash-out exactly at the crash instant counts as a win.
            let m = cash_out.multiplier();
            if m <= *multiplier {
                Ok(Some(m))
            } else {
                Ok(None)
            }
        }
        (BetSelection::Grid { revealed }, Outcome::Grid { mines, total_cells }) => {
            if revealed.iter().any(|cell| mines.contains(cell)) {
                return Ok(None);
            }
            let mine_count = mines.len() as u8;
            let m = grid_multiplier(*total_cells, mine_count, revealed.len() as u8, rules)?;
            Ok(Some(m))
        }
        (BetSelection::Duel { side }, outcome @ Outcome::CardDuel { .. }) => {
            let winner = outcome
                .duel_winner()
                .ok_or_else(|| SettlementError::Payout("card duel without winner".to_string()))?;
            if winner != *side {
                // A tie is a distinct outcome, not a push: dragon/tiger
                // stakes lose on it.
                return Ok(None);
            }
            let kind = if *side == DuelSide::Tie { "tie" } else { "side" };
            Ok(Some(table_multiplier(kind)?))
        }
        (BetSelection::Threshold { target }, Outcome::Threshold { crash_point }) => {
            if *crash_point >= *target {
                Ok(Some(*target))
            } else {
                Ok(None)
            }
        }
        (selection, outcome) => Err(SettlementError::Payout(format!(
            "selection family {} cannot settle against outcome family {}",
            selection.family(),
            outcome.family()
        ))),
    }
}

/// Running multiplier after `revealed` safe reveals: the inverse of the
/// probability of surviving that many picks, scaled by the house edge
/// factor. Kept as a product of exact ratios until the final value.
pub fn grid_multiplier(
    total_cells: u8,
    mine_count: u8,
    revealed: u8,
    rules: &GameRuleSet,
) -> Result<f64, SettlementError> {
    let house_edge = rules.payout.get("house_edge_factor").ok_or_else(|| {
        SettlementError::Payout("payout table missing 'house_edge_factor'".to_string())
    })?;

    let safe_cells = total_cells.saturating_sub(mine_count);
    if revealed > safe_cells {
        return Err(SettlementError::Payout(format!(
            "revealed {} exceeds {} safe cells",
            revealed, safe_cells
        )));
    }

    let mut multiplier = house_edge;
    for i in 0..revealed as u64 {
        let remaining_total = total_cells as u64 - i;
        let remaining_safe = safe_cells as u64 - i;
        multiplier *= remaining_total as f64 / remaining_safe as f64;
    }
    Ok(multiplier)
}
