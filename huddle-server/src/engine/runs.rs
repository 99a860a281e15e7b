//! Current-run registry
//!
//! Exactly one run is "current" per process. The cached id and the
//! read-or-create fall through a single async mutex, so two concurrent
//! cold calls cannot both decide no run exists and double-insert.

use huddle_common::db;
use huddle_common::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

/// Process-wide current-run pointer
pub struct RunRegistry {
    current: Mutex<Option<i64>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Return the current run id, lazily initializing it: reuse the
    /// most recently created run in storage, or create the first run.
    pub async fn current_run_id(&self, pool: &SqlitePool) -> Result<i64> {
        let mut current = self.current.lock().await;
        if let Some(id) = *current {
            return Ok(id);
        }
        let id = match db::latest_run_id(pool).await? {
            Some(id) => id,
            None => {
                let id = db::insert_run(pool).await?;
                info!("Created initial run {}", id);
                id
            }
        };
        *current = Some(id);
        Ok(id)
    }

    /// Start a brand-new run and swap the cached pointer to it. The
    /// previous run's persisted data is left untouched.
    pub async fn reset_run(&self, pool: &SqlitePool) -> Result<i64> {
        let mut current = self.current.lock().await;
        let id = db::insert_run(pool).await?;
        *current = Some(id);
        info!("Reset to new run {}", id);
        Ok(id)
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_common::db::init::init_memory_database;
    use std::sync::Arc;

    async fn count_runs(pool: &SqlitePool) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM runs")
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn lazy_init_creates_one_run() {
        let pool = init_memory_database().await.unwrap();
        let registry = RunRegistry::new();

        let first = registry.current_run_id(&pool).await.unwrap();
        let second = registry.current_run_id(&pool).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(count_runs(&pool).await, 1);
    }

    #[tokio::test]
    async fn reuses_latest_existing_run() {
        let pool = init_memory_database().await.unwrap();
        db::insert_run(&pool).await.unwrap();
        let latest = db::insert_run(&pool).await.unwrap();

        let registry = RunRegistry::new();
        assert_eq!(registry.current_run_id(&pool).await.unwrap(), latest);
        assert_eq!(count_runs(&pool).await, 2);
    }

    #[tokio::test]
    async fn reset_swaps_pointer_without_deleting() {
        let pool = init_memory_database().await.unwrap();
        let registry = RunRegistry::new();
        let old = registry.current_run_id(&pool).await.unwrap();

        let new = registry.reset_run(&pool).await.unwrap();
        assert_ne!(old, new);
        assert_eq!(registry.current_run_id(&pool).await.unwrap(), new);
        assert_eq!(count_runs(&pool).await, 2);
        assert!(db::get_run(&pool, old).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_cold_start_creates_exactly_one_run() {
        let pool = init_memory_database().await.unwrap();
        let registry = Arc::new(RunRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                registry.current_run_id(&pool).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(count_runs(&pool).await, 1);
    }
}
