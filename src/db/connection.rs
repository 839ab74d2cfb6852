//! Database connection management using sqlx

use crate::error::{ModelerError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub type DbPool = PgPool;

/// Initialize a connection pool and check it answers
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| ModelerError::Database(format!("Failed to connect: {}", e)))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| ModelerError::Database(format!("Connection check failed: {}", e)))?;

    info!("Database pool ready");
    Ok(pool)
}
