use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::{HealthState, WorkerCounters};
use crate::compute::{usable_match_id, ComputeRequest};
use crate::config::Isolation;
use crate::error::AppError;
use crate::orchestrator::Orchestrator;
use crate::types::{ActiveMatchReport, MatchProbabilityResult, MatchSource, ProbabilityOutcome};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/resolve-match", get(get_resolve_match))
        .route("/win-probability", get(get_win_probability))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub nickname: Option<String>,
}

#[derive(Deserialize)]
pub struct WinProbabilityQuery {
    pub nickname: Option<String>,
    pub match_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ResolveResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: ActiveMatchReport,
}

#[derive(Serialize)]
pub struct WinProbabilityResponse {
    pub ok: bool,
    pub active: bool,
    pub match_source: MatchSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_state: Option<String>,
    #[serde(flatten)]
    pub result: MatchProbabilityResult,
}

/// 200 body when the player has nothing to compute for.
#[derive(Serialize)]
pub struct NoActiveMatchResponse {
    pub ok: bool,
    pub active: bool,
    pub nickname: String,
    pub player_id: String,
    pub match_source: MatchSource,
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub isolation: String,
    pub workers: WorkerCounters,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn required_nickname(raw: Option<String>) -> Result<String, AppError> {
    raw.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("query parameter 'nickname' is required".to_string()))
}

async fn get_resolve_match(
    State(state): State<ApiState>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, AppError> {
    let nickname = required_nickname(params.nickname)?;
    let report = state.orchestrator.resolve(&nickname).await?;
    Ok(Json(ResolveResponse { ok: true, report }))
}

fn no_active_match(nickname: String, player_id: String, match_source: MatchSource) -> Response {
    let error = format!("no active match for '{nickname}'");
    (
        StatusCode::OK,
        Json(NoActiveMatchResponse { ok: false, active: false, nickname, player_id, match_source, error }),
    )
        .into_response()
}

async fn get_win_probability(
    State(state): State<ApiState>,
    Query(params): Query<WinProbabilityQuery>,
) -> Result<Response, AppError> {
    let nickname = required_nickname(params.nickname)?;

    let (req, match_source, match_state) = match usable_match_id(&nickname, params.match_id.as_deref()) {
        Some(id) => (ComputeRequest::provided(nickname.as_str(), id), MatchSource::Provided, None),
        None => {
            let report = state.orchestrator.resolve(&nickname).await?;
            match (report.active, report.match_id) {
                (true, Some(id)) => (
                    ComputeRequest::resolved(nickname.as_str(), id),
                    MatchSource::Resolved,
                    report.state,
                ),
                _ => return Ok(no_active_match(report.nickname, report.player_id, MatchSource::Resolved)),
            }
        }
    };

    match state.orchestrator.compute(&req).await? {
        ProbabilityOutcome::Computed(result) => {
            info!(
                nickname = %nickname,
                match_id = %result.match_id,
                source = ?match_source,
                pct = result.win_probability_pct,
                "win probability served"
            );
            Ok(Json(WinProbabilityResponse {
                ok: true,
                active: true,
                match_source,
                match_state,
                result: *result,
            })
            .into_response())
        }
        ProbabilityOutcome::NoActiveMatch { nickname, player_id } => {
            Ok(no_active_match(nickname, player_id, match_source))
        }
    }
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let isolation: Isolation = state.orchestrator.isolation();
    Json(HealthResponse {
        status: "ok",
        isolation: isolation.to_string(),
        workers: state.health.snapshot(),
    })
}
