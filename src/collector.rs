//! Schema collection from a live data source
//!
//! `SchemaCollector` is the seam the service depends on.
//! `PostgresSchemaCollector` reads `information_schema` for one schema:
//! columns in ordinal order, declared primary keys and foreign keys.

use crate::db::init_pool;
use crate::error::{ModelerError, Result};
use crate::schema::{ColumnSchema, ForeignKeySchema, TableSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, info};

pub const DEFAULT_SCHEMA: &str = "public";

/// A registered data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub connection_url: String,
}

#[async_trait]
pub trait SchemaCollector: Send + Sync {
    /// Tables of `schema_name` (the collector's default schema when `None`)
    async fn collect_schema(
        &self,
        data_source: &DataSource,
        schema_name: Option<&str>,
    ) -> Result<Vec<TableSchema>>;
}

/// `(table_name, column_name, data_type, is_nullable, column_default)`
pub type ColumnRow = (String, String, String, String, Option<String>);

/// `(table_name, column_name)`
pub type KeyRow = (String, String);

/// `(table_name, column_name, referenced_schema, referenced_table, referenced_column)`
pub type ForeignKeyRow = (String, String, String, String, String);

#[derive(Debug, Default)]
pub struct PostgresSchemaCollector;

impl PostgresSchemaCollector {
    pub fn new() -> Self {
        Self
    }

    async fn load_columns(pool: &PgPool, schema: &str) -> Result<Vec<ColumnRow>> {
        sqlx::query_as(
            r#"
            SELECT c.table_name::text, c.column_name::text, c.data_type::text,
                   c.is_nullable::text, c.column_default::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
              ON t.table_schema = c.table_schema AND t.table_name = c.table_name
            WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| ModelerError::Database(format!("Failed to load columns: {}", e)))
    }

    async fn load_primary_keys(pool: &PgPool, schema: &str) -> Result<Vec<KeyRow>> {
        sqlx::query_as(
            r#"
            SELECT kcu.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
             AND kcu.constraint_schema = tc.constraint_schema
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1
            ORDER BY kcu.table_name, kcu.ordinal_position
            "#,
        )
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| ModelerError::Database(format!("Failed to load primary keys: {}", e)))
    }

    async fn load_foreign_keys(pool: &PgPool, schema: &str) -> Result<Vec<ForeignKeyRow>> {
        sqlx::query_as(
            r#"
            SELECT kcu.table_name::text, kcu.column_name::text,
                   ccu.table_schema::text, ccu.table_name::text, ccu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
             AND kcu.constraint_schema = tc.constraint_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name
             AND ccu.constraint_schema = tc.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
            ORDER BY kcu.table_name, kcu.ordinal_position
            "#,
        )
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(|e| ModelerError::Database(format!("Failed to load foreign keys: {}", e)))
    }
}

#[async_trait]
impl SchemaCollector for PostgresSchemaCollector {
    async fn collect_schema(
        &self,
        data_source: &DataSource,
        schema_name: Option<&str>,
    ) -> Result<Vec<TableSchema>> {
        let schema = schema_name.unwrap_or(DEFAULT_SCHEMA);
        let pool = init_pool(&data_source.connection_url).await?;

        let columns = Self::load_columns(&pool, schema).await?;
        let primary_keys = Self::load_primary_keys(&pool, schema).await?;
        let foreign_keys = Self::load_foreign_keys(&pool, schema).await?;
        pool.close().await;

        let tables = assemble_tables(schema, columns, primary_keys, foreign_keys);
        info!(
            "Collected {} tables from {} ({})",
            tables.len(),
            data_source.name,
            schema
        );
        Ok(tables)
    }
}

/// Group catalog rows into tables, keeping the first-seen table order
pub fn assemble_tables(
    schema: &str,
    columns: Vec<ColumnRow>,
    primary_keys: Vec<KeyRow>,
    foreign_keys: Vec<ForeignKeyRow>,
) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (table_name, column_name, data_type, is_nullable, default) in columns {
        let idx = *positions.entry(table_name.clone()).or_insert_with(|| {
            tables.push(TableSchema::new(schema, table_name.clone(), Vec::new()));
            tables.len() - 1
        });
        let mut column = ColumnSchema::new(column_name, data_type)
            .nullable(is_nullable.eq_ignore_ascii_case("YES"));
        column.default = default;
        tables[idx].columns.push(column);
    }

    for (table_name, column_name) in primary_keys {
        let Some(&idx) = positions.get(&table_name) else {
            debug!("Primary key on unknown table {}", table_name);
            continue;
        };
        tables[idx]
            .primary_keys
            .get_or_insert_with(Vec::new)
            .push(column_name);
    }

    for (table_name, column_name, referenced_schema, referenced_table, referenced_column) in foreign_keys {
        let Some(&idx) = positions.get(&table_name) else {
            debug!("Foreign key on unknown table {}", table_name);
            continue;
        };
        tables[idx]
            .foreign_keys
            .get_or_insert_with(Vec::new)
            .push(ForeignKeySchema {
                column_name,
                referenced_schema: Some(referenced_schema),
                referenced_table,
                referenced_column,
            });
    }

    tables
}
