//! Logical table names stored by the upload pipeline

use crate::error::{ModelerError, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

/// Source of logical names keyed by physical table name
#[async_trait]
pub trait LogicalNameStore: Send + Sync {
    async fn logical_names(
        &self,
        data_source_id: i64,
        schema_name: &str,
    ) -> Result<HashMap<String, String>>;
}

/// Store used when no metadata database is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogicalNames;

#[async_trait]
impl LogicalNameStore for NoLogicalNames {
    async fn logical_names(&self, _data_source_id: i64, _schema_name: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

pub struct TableMetadataRepository {
    pool: PgPool,
}

impl TableMetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogicalNameStore for TableMetadataRepository {
    async fn logical_names(
        &self,
        data_source_id: i64,
        schema_name: &str,
    ) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT physical_table_name, logical_table_name
            FROM table_metadata
            WHERE data_source_id = $1 AND schema_name = $2
            "#,
        )
        .bind(data_source_id)
        .bind(schema_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModelerError::Database(format!("Failed to load table metadata: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|(physical, logical)| {
                logical
                    .filter(|name| !name.trim().is_empty())
                    .map(|name| (physical, name))
            })
            .collect())
    }
}
