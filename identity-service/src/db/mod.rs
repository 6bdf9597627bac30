//! Storage plumbing for the PostgreSQL directory.

use anyhow::Context;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};

use crate::config::DatabaseConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Open the directory pool and bring `local_users` up to date.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(config.url.expose_secret())
        .await
        .context("connecting to the directory database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("applying directory migrations")?;

    tracing::info!(
        max_connections = config.max_connections,
        "Directory database ready"
    );
    Ok(pool)
}

/// Round-trip time of a trivial query.
pub async fn ping(pool: &PgPool) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn connect_migrates_and_answers_ping() {
        let config = DatabaseConfig {
            url: Secret::new("postgres://localhost/identity_test".to_string()),
            max_connections: 2,
            min_connections: 1,
        };

        let pool = connect(&config).await.unwrap();
        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(applied >= 1);
        assert!(ping(&pool).await.is_ok());
    }
}
