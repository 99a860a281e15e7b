//! Request handlers

use axum::{extract::State, response::Json};
use huddle_common::db;
use huddle_common::events::{Pairing, Summary};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::engine::{graph, ingest, matching, summary};
use crate::error::{ApiError, ApiResult};
use crate::sse::notify;
use crate::state::AppState;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "module": "huddle-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub name: String,
}

/// POST /api/join - register a participant
pub async fn join(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Json<Value>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let participant_id = db::insert_participant(&state.db, name).await?;
    info!("Participant {} joined as '{}'", participant_id, name);

    notify::broadcast_participant_count(&state).await?;

    Ok(Json(json!({ "participant_id": participant_id })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub participant_id: i64,
    #[serde(default)]
    pub kind: Option<String>,
    pub payload: Value,
}

/// POST /api/submit - ingest one statement for the current run
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<Value>> {
    let kind = request.kind.as_deref().unwrap_or("line");
    let submission_id =
        ingest::ingest_submission(&state, request.participant_id, kind, &request.payload).await?;

    Ok(Json(json!({ "ok": true, "submission_id": submission_id })))
}

/// POST /api/summary - compute, persist and broadcast the run summary
pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<Summary>> {
    let summary = summary::run_summary(&state).await?;
    Ok(Json(summary))
}

/// POST /api/match - compute, persist and broadcast the run pairing
pub async fn compute_matches(State(state): State<AppState>) -> ApiResult<Json<Pairing>> {
    let pairing = matching::run_matching(&state).await?;
    Ok(Json(pairing))
}

/// GET /api/run/current
pub async fn current_run(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let run_id = state.runs.current_run_id(&state.db).await?;
    Ok(Json(json!({ "run_id": run_id })))
}

/// POST /api/run/reset - start a new run and refresh all clients
pub async fn reset_run(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let run_id = state.runs.reset_run(&state.db).await?;

    // Everyone flips to the fresh, empty run
    notify::broadcast_submission_count(&state, run_id).await?;
    graph::build_and_broadcast(&state).await?;

    Ok(Json(json!({ "ok": true, "run_id": run_id })))
}
