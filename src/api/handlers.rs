//! Request handlers over the engine.

use super::errors::ApiError;
use super::middleware::RequestId;
use super::models::{
    BalanceResponse, GamesResponse, HealthResponse, PlaceBetRequest, PlaceBetResponse,
};
use crate::engine::Engine;
use crate::round::history::ClosedRound;
use crate::round::scheduler::{EscalatedBet, RoundView};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for all handlers.
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

pub async fn games_handler(State(state): State<Arc<AppState>>) -> Json<GamesResponse> {
    Json(GamesResponse { games: state.engine.game_ids() })
}

/// Bet intake. Rejections come back with the placement's own reason code.
pub async fn place_bet_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<Json<PlaceBetResponse>, ApiError> {
    let bet_id = state
        .engine
        .place_bet(
            &request.player_id,
            &request.game_id,
            request.selection,
            request.stake,
            request.quantity,
        )
        .map_err(|reason| ApiError::rejected(request_id.0.clone(), reason))?;

    Ok(Json(PlaceBetResponse { bet_id, game_id: request.game_id }))
}

/// Public view of a game's live round: phase, timing, outcome once drawn.
pub async fn current_round_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<String>,
) -> Result<Json<RoundView>, ApiError> {
    state
        .engine
        .current_round(&game_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("unknown game: {}", game_id))
        })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Closed-round feed, newest first.
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ClosedRound>>, ApiError> {
    state
        .engine
        .history(&game_id, query.limit.min(100))
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(request_id.0.clone(), format!("unknown game: {}", game_id))
        })
}

pub async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.engine.balance_of(&player_id).await;
    Json(BalanceResponse { player_id, balance })
}

/// Operational alert surface: bets that exhausted their retry budget.
pub async fn escalations_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<EscalatedBet>> {
    Json(state.engine.escalations())
}

/// Prometheus metrics in text exposition format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.engine.metrics().export()
}
