//! # Database Connection
//!
//! Persistence is optional. When `DATABASE_URL` is set, the store
//! persists wallet metadata, balance history, and audit records to
//! PostgreSQL. When absent, it falls back to an in-memory backend
//! guarded by a `tokio::sync::RwLock` — suitable for development and
//! for running without a live database.

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run embedded migrations.
///
/// Returns `Ok(None)` if `DATABASE_URL` is not set. Returns `Err` if the
/// URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set - running in-memory only mode, state will not survive restarts"
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}
