//! Database models and query helpers
//!
//! Thin typed wrappers over the four tables. All ids are SQLite rowids,
//! so ordering by id matches creation order within a table.

use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub clusters_json: Option<String>,
    pub pairs_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub id: i64,
    pub display_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: i64,
    pub run_id: i64,
    pub participant_id: i64,
    pub kind: String,
    pub payload_json: String,
    pub created_at: NaiveDateTime,
}

/// One embedding record, 1:1 with its submission
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmbeddingRow {
    pub submission_id: i64,
    pub payload_json: String,
    pub vector_json: String,
}

// ---- runs ----

pub async fn insert_run(pool: &SqlitePool) -> Result<i64> {
    let result = sqlx::query("INSERT INTO runs DEFAULT VALUES")
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn latest_run_id(pool: &SqlitePool) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM runs ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn get_run(pool: &SqlitePool, run_id: i64) -> Result<Option<Run>> {
    let run = sqlx::query_as::<_, Run>(
        "SELECT id, created_at, clusters_json, pairs_json FROM runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;
    Ok(run)
}

pub async fn save_run_summary(pool: &SqlitePool, run_id: i64, clusters_json: &str) -> Result<()> {
    sqlx::query("UPDATE runs SET clusters_json = ? WHERE id = ?")
        .bind(clusters_json)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn save_run_pairing(pool: &SqlitePool, run_id: i64, pairs_json: &str) -> Result<()> {
    sqlx::query("UPDATE runs SET pairs_json = ? WHERE id = ?")
        .bind(pairs_json)
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- participants ----

pub async fn insert_participant(pool: &SqlitePool, display_name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO participants (display_name) VALUES (?)")
        .bind(display_name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn participant_exists(pool: &SqlitePool, participant_id: i64) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM participants WHERE id = ?")
        .bind(participant_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn list_participants(pool: &SqlitePool) -> Result<Vec<Participant>> {
    let participants = sqlx::query_as::<_, Participant>(
        "SELECT id, display_name, created_at FROM participants ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(participants)
}

pub async fn count_participants(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM participants")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---- submissions ----

pub async fn insert_submission(
    pool: &SqlitePool,
    run_id: i64,
    participant_id: i64,
    kind: &str,
    payload_json: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO submissions (run_id, participant_id, kind, payload_json) VALUES (?, ?, ?, ?)",
    )
    .bind(run_id)
    .bind(participant_id)
    .bind(kind)
    .bind(payload_json)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// All submissions for a run in creation (id) order
pub async fn submissions_for_run(pool: &SqlitePool, run_id: i64) -> Result<Vec<Submission>> {
    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT id, run_id, participant_id, kind, payload_json, created_at
         FROM submissions WHERE run_id = ? ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(submissions)
}

pub async fn count_submissions(pool: &SqlitePool, run_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM submissions WHERE run_id = ?")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// The most recent `limit` submissions for a run, oldest first
pub async fn recent_submissions(
    pool: &SqlitePool,
    run_id: i64,
    limit: i64,
) -> Result<Vec<Submission>> {
    let mut submissions = sqlx::query_as::<_, Submission>(
        "SELECT id, run_id, participant_id, kind, payload_json, created_at
         FROM submissions WHERE run_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    submissions.reverse();
    Ok(submissions)
}

// ---- embeddings ----

pub async fn insert_embedding(
    pool: &SqlitePool,
    submission_id: i64,
    payload_json: &str,
    vector_json: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO embeddings (submission_id, payload_json, vector_json) VALUES (?, ?, ?)")
        .bind(submission_id)
        .bind(payload_json)
        .bind(vector_json)
        .execute(pool)
        .await?;
    Ok(())
}

/// Embedding rows for every submission in a run, in submission id order
pub async fn embeddings_for_run(pool: &SqlitePool, run_id: i64) -> Result<Vec<EmbeddingRow>> {
    let rows = sqlx::query_as::<_, EmbeddingRow>(
        "SELECT e.submission_id, e.payload_json, e.vector_json
         FROM embeddings e
         JOIN submissions s ON s.id = e.submission_id
         WHERE s.run_id = ? ORDER BY e.submission_id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
