//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently (`CREATE TABLE IF NOT EXISTS`), so a fresh deployment
//! needs no separate migration step.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database pool for tests.
///
/// Limited to a single connection: each SQLite `:memory:` connection is
/// its own database, so a larger pool would scatter the schema.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_runs_table(pool).await?;
    create_participants_table(pool).await?;
    create_submissions_table(pool).await?;
    create_embeddings_table(pool).await?;
    Ok(())
}

/// Runs: one exercise session, plus saved summary/pairing snapshots
async fn create_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            clusters_json TEXT,
            pairs_json TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_participants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Submissions: type-agnostic payload JSON holding the statement fields
async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id INTEGER NOT NULL
                REFERENCES runs(id) ON DELETE CASCADE ON UPDATE CASCADE,
            participant_id INTEGER NOT NULL
                REFERENCES participants(id) ON DELETE CASCADE ON UPDATE CASCADE,
            kind TEXT NOT NULL DEFAULT 'line',
            payload_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Embeddings: exactly one row per submission, cascade-deleted with it
async fn create_embeddings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            submission_id INTEGER PRIMARY KEY
                REFERENCES submissions(id) ON DELETE CASCADE ON UPDATE CASCADE,
            payload_json TEXT NOT NULL,
            vector_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
