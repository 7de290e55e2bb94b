// PostgreSQL Connection Pool Setup

use std::time::Duration;

use conveyor_core::error::EngineError;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Create a PostgreSQL connection pool from a DSN.
///
/// # Configuration
/// - `CONVEYOR_POOL_SIZE`: max connections (default: 10)
/// - `CONVEYOR_POOL_TIMEOUT`: acquire timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<PgPool, EngineError> {
    let max_connections: u32 = std::env::var("CONVEYOR_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let acquire_timeout_secs: u64 = std::env::var("CONVEYOR_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))
}
