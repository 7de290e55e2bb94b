// SQLite Connection Pool Setup

use std::str::FromStr;
use std::time::Duration;

use conveyor_core::error::EngineError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Create a SQLite connection pool with WAL mode and a busy timeout.
///
/// # Configuration
/// - `CONVEYOR_POOL_SIZE`: max connections (default: 20)
/// - `CONVEYOR_POOL_TIMEOUT`: busy timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, EngineError> {
    let max_connections: u32 = std::env::var("CONVEYOR_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let busy_timeout_secs: u64 = std::env::var("CONVEYOR_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| EngineError::Database(e.to_string()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(busy_timeout_secs))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

    Ok(pool)
}

/// One-connection in-memory pool for tests. A multi-connection pool would
/// hand each connection its own private in-memory database.
pub async fn memory_pool() -> Result<SqlitePool, EngineError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| EngineError::Database(e.to_string()))?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool() {
        let pool = memory_pool().await.unwrap();
        assert!(pool.acquire().await.is_ok());
    }
}
