//! Inference service
//!
//! Entry point used by the data modeler: wires the engine to its
//! collaborators (schema collector, logical-name store, suggestion cache).
//! Every collaborator failure degrades instead of failing the request:
//! - cache errors are logged and treated as a miss / skipped write
//! - logical-name errors fall back to physical names
//! - collection errors yield an empty result

use crate::cache::{cache_key, SuggestionCache, DEFAULT_CACHE_TTL};
use crate::collector::{DataSource, SchemaCollector, DEFAULT_SCHEMA};
use crate::db::LogicalNameStore;
use crate::engine::{InferenceOptions, JoinInferenceEngine, CONVERSATION_PREFIX};
use crate::schema::TableSchema;
use crate::suggestion::InferredJoin;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default cap on the number of tables analysed per data source
pub const DEFAULT_MAX_TABLES: usize = 20;

pub struct InferenceService {
    engine: JoinInferenceEngine,
    collector: Arc<dyn SchemaCollector>,
    logical_names: Arc<dyn LogicalNameStore>,
    cache: Arc<dyn SuggestionCache>,
    cache_ttl: Duration,
}

impl InferenceService {
    pub fn new(
        engine: JoinInferenceEngine,
        collector: Arc<dyn SchemaCollector>,
        logical_names: Arc<dyn LogicalNameStore>,
        cache: Arc<dyn SuggestionCache>,
    ) -> Self {
        Self {
            engine,
            collector,
            logical_names,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub async fn infer_joins(
        &self,
        tables: &[TableSchema],
        options: &InferenceOptions,
    ) -> Vec<InferredJoin> {
        self.engine.infer_joins(tables, options).await
    }

    pub async fn infer_joins_from_data_source(
        &self,
        data_source: &DataSource,
        data_source_id: i64,
        schema_name: Option<&str>,
        options: &InferenceOptions,
        max_tables: usize,
    ) -> Vec<InferredJoin> {
        let key = cache_key(data_source_id, schema_name);

        if let Some(cached) = self.cached(&key).await {
            return cached;
        }

        let mut tables = match self.collector.collect_schema(data_source, schema_name).await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(
                    "Schema collection failed for data source {} ({}): {}",
                    data_source_id, data_source.name, e
                );
                return Vec::new();
            }
        };

        if tables.len() > max_tables {
            warn!(
                "Data source {} has {} tables, analysing the first {}",
                data_source_id,
                tables.len(),
                max_tables
            );
            tables.truncate(max_tables);
        }

        let logical_schema = schema_name.unwrap_or(DEFAULT_SCHEMA);
        let names = match self
            .logical_names
            .logical_names(data_source_id, logical_schema)
            .await
        {
            Ok(names) => names,
            Err(e) => {
                warn!("Logical names unavailable, using physical names: {}", e);
                HashMap::new()
            }
        };
        apply_logical_names(&mut tables, &names);

        let options = options
            .clone()
            .or_conversation(format!("{}:{}", CONVERSATION_PREFIX, key));
        let joins = self.engine.infer_joins(&tables, &options).await;
        self.store(&key, &joins).await;
        joins
    }

    async fn cached(&self, key: &str) -> Option<Vec<InferredJoin>> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<InferredJoin>>(&raw) {
                Ok(joins) => {
                    info!("Serving {} cached joins for {}", joins.len(), key);
                    Some(joins)
                }
                Err(e) => {
                    warn!("Ignoring unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss for {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, joins: &[InferredJoin]) {
        let payload = match serde_json::to_string(joins) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not serialize joins for cache: {}", e);
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, self.cache_ttl, payload).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

/// Set `display_name` from the store; tables without a stored name keep
/// their existing display name, or the physical name when they have none
pub fn apply_logical_names(tables: &mut [TableSchema], names: &HashMap<String, String>) {
    for table in tables.iter_mut() {
        match names.get(&table.table_name) {
            Some(logical) => table.display_name = Some(logical.clone()),
            None => {
                if table.display_name.is_none() {
                    table.display_name = Some(table.table_name.clone());
                }
            }
        }
    }
}
