// SQLite connection pool shared by every store.

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Connect to a SQLite database.
///
/// Accepts a bare file path, a `sqlite://` URL, or `sqlite::memory:`.
/// File databases (and their parent directory) are created if missing.
/// In-memory databases are pinned to a single connection that never expires,
/// otherwise each pooled connection would see its own empty database.
pub async fn connect_pool(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    if database_url.contains(":memory:") {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        return Ok(pool);
    }

    let path_str = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path_str = path_str.split('?').next().unwrap_or(path_str);

    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", path_str))
        .await
        .with_context(|| format!("Failed to connect to SQLite database at {}", path_str))?;

    tracing::info!(path = path_str, "Connected to SQLite database");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_keeps_schema() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("moderation.db");

        connect_pool(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
    }
}
