//! Run-scoped engine: embeddings, similarity graph, matching, summary

pub mod embedding;
pub mod graph;
pub mod ingest;
pub mod matching;
pub mod runs;
pub mod summary;
pub mod text;

use std::collections::HashMap;

use huddle_common::db::{EmbeddingRow, Submission};
use huddle_common::vecmath;

/// Round a similarity score to 4 decimal places.
pub(crate) fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Representative vector per participant: the mean of all embedding
/// vectors attached to that participant's submissions in the run.
/// Participants with no embedded submissions are absent from the map.
pub(crate) fn participant_vectors(
    submissions: &[Submission],
    embeddings: &[EmbeddingRow],
) -> HashMap<i64, Vec<f64>> {
    let vector_by_submission: HashMap<i64, Vec<f64>> = embeddings
        .iter()
        .filter_map(|row| {
            serde_json::from_str::<Vec<f64>>(&row.vector_json)
                .ok()
                .map(|v| (row.submission_id, v))
        })
        .collect();

    let mut grouped: HashMap<i64, Vec<Vec<f64>>> = HashMap::new();
    for submission in submissions {
        if let Some(vector) = vector_by_submission.get(&submission.id) {
            grouped
                .entry(submission.participant_id)
                .or_default()
                .push(vector.clone());
        }
    }

    grouped
        .into_iter()
        .map(|(pid, vectors)| (pid, vecmath::mean(&vectors)))
        .collect()
}
