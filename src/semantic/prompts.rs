//! Prompts for semantic join suggestion and junction classification

use crate::naming::clean_logical_name;
use crate::schema::TableSchema;

/// System prompt installed once per conversation
pub const DATA_MODELER_SYSTEM_PROMPT: &str = r#"You are a data modeling assistant working inside an analytics product.

## Your Role

Given the tables of a data source, propose JOIN relationships a human analyst would accept.
Most tables come from spreadsheet or PDF imports: they have machine-generated physical names,
human-entered logical names, and no declared foreign keys.

## Rules

1. Use physical table names and exact column names from the schema in your answer
2. Only propose joins between columns that hold the same kind of identifier
3. Prefer primary key → foreign key relationships over coincidental name matches
4. Report confidence_score on a 0-100 scale
5. join_type is one of INNER, LEFT, RIGHT

Always answer with JSON only, no prose."#;

fn describe_table(out: &mut String, table: &TableSchema) {
    let logical = clean_logical_name(table.display_name());
    if logical.eq_ignore_ascii_case(&table.table_name) {
        out.push_str(&format!("Table {}.{}\n", table.schema, table.table_name));
    } else {
        out.push_str(&format!(
            "Table {}.{} (logical name: \"{}\")\n",
            table.schema, table.table_name, logical
        ));
    }

    let keys = table.primary_keys();
    for column in &table.columns {
        let mut flags: Vec<&str> = Vec::new();
        if keys.iter().any(|k| k.eq_ignore_ascii_case(&column.column_name)) {
            flags.push("PK");
        }
        match column.nullable {
            Some(true) => flags.push("NULL"),
            Some(false) => flags.push("NOT NULL"),
            None => {}
        }
        if flags.is_empty() {
            out.push_str(&format!("  - {} {}\n", column.column_name, column.data_type));
        } else {
            out.push_str(&format!(
                "  - {} {} [{}]\n",
                column.column_name,
                column.data_type,
                flags.join(", ")
            ));
        }
    }

    for fk in table.foreign_keys() {
        out.push_str(&format!(
            "  FK {} -> {}.{}\n",
            fk.column_name, fk.referenced_table, fk.referenced_column
        ));
    }
}

/// Prompt asking for join proposals across the whole snapshot
pub fn join_suggestion_prompt(tables: &[TableSchema]) -> String {
    let mut schema = String::new();
    for table in tables {
        describe_table(&mut schema, table);
        schema.push('\n');
    }

    format!(
        r#"Analyze these tables and propose JOIN relationships between them.

{}
Return JSON:
{{
  "joins": [
    {{
      "left_table": "customers",
      "left_column": "id",
      "right_table": "orders",
      "right_column": "customer_id",
      "confidence_score": 90,
      "reasoning": "orders.customer_id references customers.id",
      "join_type": "LEFT"
    }}
  ]
}}

Return an empty "joins" list when no relationship is plausible."#,
        schema
    )
}

/// Prompt asking whether one table is a many-to-many bridge
pub fn junction_classification_prompt(table: &TableSchema, tables: &[TableSchema]) -> String {
    let mut target = String::new();
    describe_table(&mut target, table);

    let others: Vec<String> = tables
        .iter()
        .filter(|t| t.table_name != table.table_name)
        .map(|t| {
            let logical = clean_logical_name(t.display_name());
            if logical.eq_ignore_ascii_case(&t.table_name) {
                t.table_name.clone()
            } else {
                format!("{} (\"{}\")", t.table_name, logical)
            }
        })
        .collect();

    format!(
        r#"Is this table a junction (bridge) table linking other tables in a many-to-many relationship?

{}
Other tables: {}

Return JSON:
{{
  "is_junction": true,
  "confidence": 85,
  "connected_tables": [{{"table": "students", "column": "student_ref"}}, {{"table": "courses", "column": "course_ref"}}],
  "reasoning": "each row pairs one student with one course"
}}"#,
        target,
        others.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;

    #[test]
    fn test_join_prompt_lists_names_and_keys() {
        let tables = vec![
            TableSchema::new("public", "tbl_9", vec![
                ColumnSchema::new("id", "int").nullable(false),
                ColumnSchema::new("name", "text"),
            ])
            .with_display_name("Vendors - list.xlsx")
            .with_primary_keys(&["id"]),
        ];
        let prompt = join_suggestion_prompt(&tables);
        assert!(prompt.contains("Table public.tbl_9 (logical name: \"Vendors\")"));
        assert!(prompt.contains("  - id int [PK, NOT NULL]"));
        assert!(prompt.contains("  - name text\n"));
    }

    #[test]
    fn test_junction_prompt_excludes_target() {
        let tables = vec![
            TableSchema::new("public", "links", vec![ColumnSchema::new("a", "int")]),
            TableSchema::new("public", "members", vec![]),
        ];
        let prompt = junction_classification_prompt(&tables[0], &tables);
        assert!(prompt.contains("Other tables: members"));
        assert!(prompt.contains("Table public.links"));
    }
}
