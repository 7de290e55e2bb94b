// Migration Runner

use conveyor_core::error::EngineError;
use sqlx::SqlitePool;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "initial schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Run database migrations, tracking the applied version in
/// `schema_version`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), EngineError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(db_err)?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(db_err)?;

    for (version, label, sql) in MIGRATIONS {
        if current_version >= *version {
            continue;
        }
        info!(version, label, "applying migration");
        apply_migration(pool, *version, sql).await?;
    }

    Ok(())
}

/// Apply a single migration script in a transaction.
async fn apply_migration(pool: &SqlitePool, version: i64, sql: &str) -> Result<(), EngineError> {
    let mut tx = pool.begin().await.map_err(db_err)?;

    sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(db_err)?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

    tx.commit().await.map_err(db_err)?;
    Ok(())
}

fn db_err(err: sqlx::Error) -> EngineError {
    EngineError::Database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_tasks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, 1);
    }
}
