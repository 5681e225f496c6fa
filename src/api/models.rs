//! API request and response models.

use crate::games::types::{Amount, BetSelection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Bet intake request: maps directly to the engine's place_bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub player_id: String,
    pub game_id: String,
    #[serde(flatten)]
    pub selection: BetSelection,
    /// Stake per unit, minor units.
    pub stake: Amount,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetResponse {
    pub bet_id: Uuid,
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub player_id: String,
    /// Effective balance (confirmed + pending), minor units.
    pub balance: Amount,
}

/// Configured games listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamesResponse {
    pub games: Vec<String>,
}
