//! Statement ingestion
//!
//! The write path behind `POST /api/submit`: validate, persist the
//! submission and its embedding record, then push the updated count,
//! graph and the new line to all subscribers.

use huddle_common::db;
use huddle_common::events::{name, LinePayload};
use huddle_common::{Error, Result};
use serde_json::Value;

use super::graph;
use super::text::extract_text;
use crate::sse::notify;
use crate::state::AppState;

/// Ingest one statement for the current run. Returns the new
/// submission's id.
pub async fn ingest_submission(
    state: &AppState,
    participant_id: i64,
    kind: &str,
    payload: &Value,
) -> Result<i64> {
    if !db::participant_exists(&state.db, participant_id).await? {
        return Err(Error::InvalidInput(format!(
            "unknown participant {}",
            participant_id
        )));
    }
    let text = extract_text(payload);
    if text.is_empty() {
        return Err(Error::InvalidInput(
            "submission payload has no text".to_string(),
        ));
    }

    // Captured once: a concurrent run reset must not retarget this
    // ingestion, it completes against the run that was current here.
    let run_id = state.runs.current_run_id(&state.db).await?;

    let payload_json =
        serde_json::to_string(payload).map_err(|e| Error::Internal(e.to_string()))?;
    let submission_id =
        db::insert_submission(&state.db, run_id, participant_id, kind, &payload_json).await?;

    let vector = state.embedder.embed(&text).await;
    let normalized = serde_json::json!({ "clean_text": text });
    let vector_json =
        serde_json::to_string(&vector).map_err(|e| Error::Internal(e.to_string()))?;
    db::insert_embedding(&state.db, submission_id, &normalized.to_string(), &vector_json).await?;

    notify::broadcast_submission_count(state, run_id).await?;

    let graph = graph::build_graph(&state.db, run_id, &state.engine).await?;
    state.bus.publish(name::GRAPH, &graph);

    state.bus.publish(
        name::LINE,
        &LinePayload {
            submission_id,
            participant_id,
            text,
        },
    );

    Ok(submission_id)
}
