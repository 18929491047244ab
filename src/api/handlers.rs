//! HTTP API handlers for the operator surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::agent::MakerAgent;
use crate::error::{AgentError, PositionError};
use crate::market::refdata::ReferenceData;
use crate::market::types::PositionId;
use crate::odds::implied_of_wire;
use crate::position::types::{Position, PositionPatch, PositionSpec};
use crate::stake::wire_to_stake;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// The agent core.
    pub agent: Arc<MakerAgent>,
    /// Reference-data client; absent when running against injected seams.
    pub refdata: Option<Arc<ReferenceData>>,
    /// Whether the agent is ready to accept positions.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    /// Create state around an agent.
    pub fn new(agent: Arc<MakerAgent>, refdata: Option<Arc<ReferenceData>>) -> Self {
        Self {
            agent,
            refdata,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the agent accepts positions.
    pub ready: bool,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Total positions.
    pub positions: usize,
    /// Quoting positions.
    pub active: usize,
    /// Risk-paused positions.
    pub risk_paused: usize,
    /// Completed positions.
    pub completed: usize,
}

/// Operator-facing view of a position, in nominal units.
#[derive(Debug, Serialize)]
pub struct PositionView {
    /// Position id.
    pub id: PositionId,
    /// Market being quoted.
    pub market_id: String,
    /// Outcome bet as maker.
    pub outcome: String,
    /// Lifecycle status.
    pub status: String,
    /// Venue order state.
    pub order_status: String,
    /// Maximum stake, nominal.
    pub max_stake: String,
    /// Credited fills, nominal.
    pub filled_stake: String,
    /// Premium, basis points.
    pub premium_bps: u32,
    /// Whether the risk gate is tripped.
    pub risk_breached: bool,
    /// Resting order id, if any.
    pub active_order_id: Option<String>,
    /// Last observed best taker quote, implied probability.
    pub best_taker_odds: Option<String>,
    /// Last observed vig, implied probability.
    pub vig: Option<String>,
}

impl PositionView {
    /// Render a position in nominal units.
    pub fn from_position(position: &Position, units: crate::config::Units) -> Self {
        Self {
            id: position.id,
            market_id: position.market_id.clone(),
            outcome: position.outcome.to_string(),
            status: position.status.to_string(),
            order_status: position.order_status.to_string(),
            max_stake: wire_to_stake(position.max_stake, units.stake_unit).to_string(),
            filled_stake: wire_to_stake(position.filled_stake, units.stake_unit).to_string(),
            premium_bps: position.premium_bps,
            risk_breached: position.risk_breached,
            active_order_id: position.active_order_id.clone(),
            best_taker_odds: position
                .last_best_taker_odds
                .map(|odds| implied_of_wire(odds, units.odds_unit).to_string()),
            vig: position.last_vig.map(|vig| {
                if vig < 0 {
                    format!("-{}", implied_of_wire(vig.unsigned_abs(), units.odds_unit))
                } else {
                    implied_of_wire(vig as u128, units.odds_unit).to_string()
                }
            }),
        }
    }
}

/// Error body returned by the API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error.
    pub error: String,
}

fn error_response(error: AgentError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        AgentError::Position(PositionError::NotFound(_)) => StatusCode::NOT_FOUND,
        AgentError::Position(PositionError::Gone) => StatusCode::NOT_FOUND,
        AgentError::Position(PositionError::InvalidSpec(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse { ready: is_ready };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - agent counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.agent.stats();
    Json(StatusResponse {
        status: "ok",
        positions: stats.positions,
        active: stats.active,
        risk_paused: stats.risk_paused,
        completed: stats.completed,
    })
}

/// Create a position from an operator spec.
pub async fn create_position(
    State(state): State<AppState>,
    Json(spec): Json<PositionSpec>,
) -> impl IntoResponse {
    match state.agent.create_position(spec).await {
        Ok(position) => (
            StatusCode::CREATED,
            Json(PositionView::from_position(&position, state.agent.units())),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// List all positions.
pub async fn list_positions(State(state): State<AppState>) -> impl IntoResponse {
    let units = state.agent.units();
    let views: Vec<PositionView> = state
        .agent
        .list_positions()
        .iter()
        .map(|p| PositionView::from_position(p, units))
        .collect();
    Json(views)
}

/// Get one position.
pub async fn get_position(
    State(state): State<AppState>,
    Path(id): Path<PositionId>,
) -> impl IntoResponse {
    match state.agent.get_position(id) {
        Some(position) => {
            Json(PositionView::from_position(&position, state.agent.units())).into_response()
        }
        None => error_response(AgentError::Position(PositionError::NotFound(id))).into_response(),
    }
}

/// Patch a position's settings.
pub async fn edit_position(
    State(state): State<AppState>,
    Path(id): Path<PositionId>,
    Json(patch): Json<PositionPatch>,
) -> impl IntoResponse {
    match state.agent.edit_position(id, patch).await {
        Ok(position) => {
            Json(PositionView::from_position(&position, state.agent.units())).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// Close a position.
pub async fn close_position(
    State(state): State<AppState>,
    Path(id): Path<PositionId>,
) -> impl IntoResponse {
    match state.agent.close_position(id).await {
        Ok(position) => {
            Json(PositionView::from_position(&position, state.agent.units())).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// List sports (reference data).
pub async fn list_sports(State(state): State<AppState>) -> impl IntoResponse {
    let Some(refdata) = state.refdata.clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match refdata.list_sports().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(AgentError::Feed(e)).into_response(),
    }
}

/// List leagues for a sport (reference data).
pub async fn list_leagues(
    State(state): State<AppState>,
    Path(sport_id): Path<String>,
) -> impl IntoResponse {
    let Some(refdata) = state.refdata.clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match refdata.list_leagues(&sport_id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(AgentError::Feed(e)).into_response(),
    }
}

/// List fixtures for a league (reference data).
pub async fn list_fixtures(
    State(state): State<AppState>,
    Path(league_id): Path<String>,
) -> impl IntoResponse {
    let Some(refdata) = state.refdata.clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match refdata.list_fixtures(&league_id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(AgentError::Feed(e)).into_response(),
    }
}

/// List markets for a fixture (reference data).
pub async fn list_markets(
    State(state): State<AppState>,
    Path(fixture_id): Path<String>,
) -> impl IntoResponse {
    let Some(refdata) = state.refdata.clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match refdata.list_markets(&fixture_id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(AgentError::Feed(e)).into_response(),
    }
}
