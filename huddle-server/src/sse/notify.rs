//! Aggregate count broadcasts
//!
//! Small helpers pushed after ingestion, join, reset and on every new
//! connection so all clients agree on the headline numbers.

use huddle_common::db;
use huddle_common::events::{name, CountPayload};
use huddle_common::Result;

use crate::state::AppState;

/// Broadcast the submission count for the given run to all subscribers.
///
/// Takes the run id explicitly: ingestion counts against the run it
/// captured at start, even if the current run was reset meanwhile.
pub async fn broadcast_submission_count(state: &AppState, run_id: i64) -> Result<()> {
    let count = db::count_submissions(&state.db, run_id).await?;
    state.bus.publish(name::SUBMISSION_COUNT, &CountPayload { count });
    Ok(())
}

/// Broadcast the participant count to all subscribers.
pub async fn broadcast_participant_count(state: &AppState) -> Result<()> {
    let count = db::count_participants(&state.db).await?;
    state.bus.publish(name::PARTICIPANT_COUNT, &CountPayload { count });
    Ok(())
}
