//! Outcome generation: one draw per round from the game's outcome domain.
//!
//! The generator is stateless per draw; at-most-once-per-round is enforced
//! by the scheduler's settlement gate, not here. Seeded construction exists
//! so tests are deterministic.

use crate::config::OutcomeDomain;
use crate::games::types::{Card, CardSuit, Outcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

const SUITS: [CardSuit; 4] = [
    CardSuit::Clubs,
    CardSuit::Diamonds,
    CardSuit::Hearts,
    CardSuit::Spades,
];

/// Draws round outcomes for every game family.
pub struct OutcomeGenerator {
    rng: Mutex<StdRng>,
}

impl OutcomeGenerator {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Draw one outcome from the given domain.
    pub fn draw(&self, domain: &OutcomeDomain) -> Outcome {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match domain {
            OutcomeDomain::Lottery => Outcome::Lottery { number: rng.gen_range(0..10) },
            OutcomeDomain::Crash { breakpoint, max_multiplier } => {
                // Piecewise curve: half the mass in the low band keeps the
                // density monotonically decreasing toward the tail.
                let multiplier = if rng.gen_bool(0.5) {
                    rng.gen_range(1.0..*breakpoint)
                } else {
                    rng.gen_range(1.0..*max_multiplier)
                };
                Outcome::Crash { multiplier }
            }
            OutcomeDomain::Grid { total_cells, mine_count } => {
                let mut mines = rand::seq::index::sample(
                    &mut *rng,
                    *total_cells as usize,
                    *mine_count as usize,
                )
                .into_iter()
                .map(|cell| cell as u8)
                .collect::<Vec<u8>>();
                mines.sort_unstable();
                Outcome::Grid { mines, total_cells: *total_cells }
            }
            OutcomeDomain::CardDuel => Outcome::CardDuel {
                dragon: draw_card(&mut rng),
                tiger: draw_card(&mut rng),
            },
            OutcomeDomain::Threshold { max_multiplier } => {
                Outcome::Threshold { crash_point: rng.gen_range(1.0..=*max_multiplier) }
            }
        }
    }
}

impl Default for OutcomeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_card(rng: &mut StdRng) -> Card {
    Card {
        rank: rng.gen_range(1..=13),
        suit: SUITS[rng.gen_range(0..SUITS.len())],
    }
}
