// Database wiring
// Builds the Postgres pool, applies migrations, and exposes the liveness
// probe used by the health endpoint

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url())
        .await
        .with_context(|| {
            format!(
                "connect Postgres at {}:{}",
                config.database_host(),
                config.database_port()
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("apply database migrations")?;

    info!(database = %config.database_name, "database pool ready");
    Ok(pool)
}

/// Liveness probe: the cheapest round trip the server can make.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
