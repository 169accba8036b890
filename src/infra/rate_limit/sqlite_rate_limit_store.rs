// SQLite-backed rate limit store.
//
// Tables:
// - rate_limit_counters: One fixed-window counter per (user, action)
// - rate_limit_hits: Timestamped hits for sliding windows
//
// Timestamps are stored as epoch milliseconds so range checks compare numbers.

use crate::core::rate_limit::{RateLimitError, RateLimitRecord, RateLimitStore, SlidingAdmission};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteRateLimitStore {
    pool: Pool<Sqlite>,
}

fn storage_error(e: impl std::fmt::Display) -> RateLimitError {
    RateLimitError::StorageError(e.to_string())
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, RateLimitError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| storage_error(format!("timestamp out of range: {}", millis)))
}

impl SqliteRateLimitStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), RateLimitError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limit_counters (
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                window_start INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, action)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limit_hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                action TEXT NOT NULL,
                hit_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_rate_limit_hits_user_action
                ON rate_limit_hits(user_id, action, hit_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    /// Timestamps of hits strictly after `since`, oldest first.
    async fn hits_since(
        &self,
        user_id: &str,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, RateLimitError> {
        let rows = sqlx::query(
            r#"
            SELECT hit_at FROM rate_limit_hits
            WHERE user_id = ? AND action = ? AND hit_at > ?
            ORDER BY hit_at ASC
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| from_millis(row.get::<i64, _>("hit_at")))
            .collect()
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn increment_fixed_window(
        &self,
        user_id: &str,
        action: &str,
        window_start: DateTime<Utc>,
    ) -> Result<RateLimitRecord, RateLimitError> {
        // Single upsert so concurrent requests can't lose increments
        let row = sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (user_id, action, window_start, count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(user_id, action) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_counters.window_start = excluded.window_start
                        THEN rate_limit_counters.count + 1
                    ELSE 1
                END,
                window_start = excluded.window_start
            RETURNING window_start, count
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(window_start.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let window_start: i64 = row.get("window_start");
        let count: i64 = row.get("count");

        Ok(RateLimitRecord {
            user_id: user_id.to_string(),
            action: action.to_string(),
            window_start: from_millis(window_start)?,
            count: count.clamp(0, u32::MAX as i64) as u32,
        })
    }

    async fn try_record_hit(
        &self,
        user_id: &str,
        action: &str,
        since: DateTime<Utc>,
        max_hits: u32,
        at: DateTime<Utc>,
    ) -> Result<SlidingAdmission, RateLimitError> {
        // Count and insert in one write statement, so SQLite's write lock
        // serializes concurrent callers
        let result = sqlx::query(
            r#"
            INSERT INTO rate_limit_hits (user_id, action, hit_at)
            SELECT ?, ?, ?
            WHERE (
                SELECT COUNT(*) FROM rate_limit_hits
                WHERE user_id = ? AND action = ? AND hit_at > ?
            ) < ?
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(at.timestamp_millis())
        .bind(user_id)
        .bind(action)
        .bind(since.timestamp_millis())
        .bind(max_hits as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(SlidingAdmission {
            allowed: result.rows_affected() == 1,
            hits: self.hits_since(user_id, action, since).await?,
        })
    }

    async fn reset(&self, user_id: &str, action: &str) -> Result<(), RateLimitError> {
        sqlx::query("DELETE FROM rate_limit_counters WHERE user_id = ? AND action = ?")
            .bind(user_id)
            .bind(action)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        sqlx::query("DELETE FROM rate_limit_hits WHERE user_id = ? AND action = ?")
            .bind(user_id)
            .bind(action)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    async fn cleanup_old_records(&self, older_than: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let cutoff = older_than.timestamp_millis();

        let counters = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        let hits = sqlx::query("DELETE FROM rate_limit_hits WHERE hit_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(counters.rows_affected() + hits.rows_affected())
    }
}
