//! Table schema snapshot consumed by the join inference engine
//!
//! A `TableSchema` is an immutable snapshot taken once per inference run.
//! Tables imported from spreadsheets or PDFs usually carry no primary or
//! foreign keys, so both are optional.

use serde::{Deserialize, Serialize};

/// Column definition as reported by the schema collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnSchema {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            nullable: None,
            default: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// Declared foreign key (rare for imported tables)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    pub column_name: String,
    #[serde(default)]
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// One table of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Database schema the table lives in (e.g. "public")
    pub schema: String,

    /// Physical table name: the stable identifier in storage
    pub table_name: String,

    /// Human-facing (logical) name; may be absent or equal to `table_name`
    #[serde(default)]
    pub display_name: Option<String>,

    pub columns: Vec<ColumnSchema>,

    #[serde(default)]
    pub primary_keys: Option<Vec<String>>,

    #[serde(default)]
    pub foreign_keys: Option<Vec<ForeignKeySchema>>,
}

impl TableSchema {
    pub fn new(
        schema: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnSchema>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table_name: table_name.into(),
            display_name: None,
            columns,
            primary_keys: None,
            foreign_keys: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_primary_keys(mut self, keys: &[&str]) -> Self {
        self.primary_keys = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Logical name, falling back to the physical name
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.table_name)
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.column_name.eq_ignore_ascii_case(name))
    }

    pub fn primary_keys(&self) -> &[String] {
        self.primary_keys.as_deref().unwrap_or(&[])
    }

    pub fn foreign_keys(&self) -> &[ForeignKeySchema] {
        self.foreign_keys.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        let table = TableSchema::new("public", "tbl_0142", vec![]);
        assert_eq!(table.display_name(), "tbl_0142");

        let table = table.with_display_name("Customers");
        assert_eq!(table.display_name(), "Customers");

        let table = TableSchema::new("public", "tbl_0142", vec![]).with_display_name("  ");
        assert_eq!(table.display_name(), "tbl_0142");
    }

    #[test]
    fn test_deserialize_minimal_table() {
        let json = r#"{
            "schema": "public",
            "table_name": "orders",
            "columns": [{"column_name": "id", "data_type": "integer"}]
        }"#;
        let table: TableSchema = serde_json::from_str(json).unwrap();
        assert!(table.primary_keys().is_empty());
        assert!(table.column("ID").is_some());
        assert_eq!(table.columns[0].nullable, None);
    }
}
