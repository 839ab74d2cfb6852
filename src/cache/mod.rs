//! Suggestion cache
//!
//! Inference results for a data source are cached as serialized JSON under
//! `ds<id>:<schema>`. The cache is advisory: callers log and swallow its
//! errors.

mod memory;
mod sqlite;

pub use memory::MemorySuggestionCache;
pub use sqlite::SqliteSuggestionCache;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// How long cached suggestions stay valid
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait SuggestionCache: Send + Sync {
    /// Cached value, `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, ttl: Duration, value: String) -> Result<()>;
}

/// `ds<id>:<schema>`; an absent schema is keyed as `default`
pub fn cache_key(data_source_id: i64, schema_name: Option<&str>) -> String {
    format!("ds{}:{}", data_source_id, schema_name.unwrap_or("default"))
}
