use super::SuggestionCache;
use crate::error::{ModelerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Cache persisted in a SQLite file. Rows carry an absolute expiry (unix
/// seconds); expired rows are purged when read.
pub struct SqliteSuggestionCache {
    db: Mutex<Connection>,
}

impl SqliteSuggestionCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(path)
            .map_err(|e| ModelerError::Cache(format!("Failed to open cache database: {}", e)))?;
        info!("Opened suggestion cache at {}", path.display());
        Self::with_connection(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| ModelerError::Cache(format!("Failed to open cache database: {}", e)))?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        let cache = Self { db: Mutex::new(db) };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS join_suggestion_cache (
                cache_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| ModelerError::Cache(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| ModelerError::Cache("Cache connection lock poisoned".to_string()))
    }

    fn read(&self, key: &str, now: i64) -> Result<Option<String>> {
        let db = self.lock()?;
        let row: Option<(String, i64)> = db
            .query_row(
                "SELECT value, expires_at FROM join_suggestion_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| ModelerError::Cache(format!("Failed to read cache: {}", e)))?;

        match row {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                let purged = db
                    .execute(
                        "DELETE FROM join_suggestion_cache WHERE expires_at <= ?1",
                        params![now],
                    )
                    .map_err(|e| ModelerError::Cache(format!("Failed to purge cache: {}", e)))?;
                debug!("Purged {} expired cache rows", purged);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, expires_at: i64, value: &str) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            r#"
            INSERT INTO join_suggestion_cache (cache_key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
            params![key, value, expires_at],
        )
        .map_err(|e| ModelerError::Cache(format!("Failed to write cache: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl SuggestionCache for SqliteSuggestionCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key, Utc::now().timestamp())
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: String) -> Result<()> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl);
        self.write(key, expires_at, &value)
    }
}
