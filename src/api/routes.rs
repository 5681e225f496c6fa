//! Route definitions: maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))
        // Configured games
        .route("/games", get(games_handler))
        // Bet intake
        .route("/bets", post(place_bet_handler))
        // Live round view + closed-round feed
        .route("/games/:game_id/round", get(current_round_handler))
        .route("/games/:game_id/history", get(history_handler))
        // Player balance (confirmed + pending)
        .route("/players/:player_id/balance", get(balance_handler))
        // Operational alerts
        .route("/escalations", get(escalations_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        // Attach shared state
        .with_state(state)
}
