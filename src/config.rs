//! Environment-driven configuration
//!
//! Read after `dotenv::dotenv()`, so a local `.env` file works the same as
//! exported variables.

use crate::error::{ModelerError, Result};
use crate::llm::DUMMY_API_KEY;
use crate::service::DEFAULT_MAX_TABLES;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelerConfig {
    /// Postgres holding `table_metadata`; logical names are skipped without it
    pub database_url: Option<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    /// SQLite cache file; an in-memory cache is used when unset
    pub cache_path: Option<PathBuf>,
    pub cache_ttl: Duration,
    pub max_tables: usize,
    pub use_ai: bool,
}

impl ModelerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL"),
            openai_api_key: get("OPENAI_API_KEY").unwrap_or_else(|| DUMMY_API_KEY.to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cache_path: get("JOIN_CACHE_PATH").map(PathBuf::from),
            cache_ttl: Duration::from_secs(parse_or("JOIN_CACHE_TTL_SECS", get("JOIN_CACHE_TTL_SECS"), DEFAULT_CACHE_TTL_SECS)?),
            max_tables: parse_or("JOIN_MAX_TABLES", get("JOIN_MAX_TABLES"), DEFAULT_MAX_TABLES)?,
            use_ai: match get("JOIN_USE_AI") {
                Some(value) => parse_bool("JOIN_USE_AI", &value)?,
                None => false,
            },
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| ModelerError::Config(format!("{}={}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ModelerError::Config(format!("{}={}: expected a boolean", key, value))),
    }
}
