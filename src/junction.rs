//! Junction (bridge) table detection
//!
//! A table is a junction when it references at least two other tables.
//! References are collected in passes, later passes only running while
//! fewer than two references are known:
//! 1. Name pattern: `<token>_id` / `<token>_key` columns resolved against
//!    physical names, then logical aliases
//! 2. Primary key: a column named like another table's declared primary key
//!    with a compatible type
//! 3. AI classification for small ambiguous tables (driven by the engine,
//!    accepted through [`accept_ai_verdict`])

use crate::naming::NameIndex;
use crate::schema::TableSchema;
use crate::semantic::response::AiJunctionVerdict;
use crate::types::types_compatible;
use tracing::debug;

/// Tables wider than this are never sent to the AI classifier
pub const AI_JUNCTION_MAX_COLUMNS: usize = 10;

/// Minimum AI confidence (0–100 scale) to accept a junction verdict
pub const AI_JUNCTION_MIN_CONFIDENCE: f64 = 70.0;

const REFERENCE_SUFFIXES: &[&str] = &["_id", "_key"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedTable {
    /// Index of the referenced table in the snapshot
    pub table: usize,
    pub table_name: String,
    /// Column of the candidate table carrying the reference (may be empty
    /// when the AI classifier did not name one)
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionCandidate {
    pub table: usize,
    pub table_name: String,
    pub referenced_tables: Vec<ReferencedTable>,
}

impl JunctionCandidate {
    fn new(table: usize, table_name: &str) -> Self {
        Self {
            table,
            table_name: table_name.to_string(),
            referenced_tables: Vec::new(),
        }
    }

    pub fn is_junction(&self) -> bool {
        self.referenced_tables.len() >= 2
    }

    pub fn references(&self, table: usize) -> bool {
        self.referenced_tables.iter().any(|r| r.table == table)
    }

    /// Add a reference unless it points at the candidate itself or is already known
    pub fn add_reference(&mut self, table: usize, table_name: &str, column: &str) -> bool {
        if table == self.table || self.references(table) {
            return false;
        }
        self.referenced_tables.push(ReferencedTable {
            table,
            table_name: table_name.to_string(),
            column: column.to_string(),
        });
        true
    }

    /// Whether the AI pass may be asked about this table
    pub fn eligible_for_ai(&self, table: &TableSchema) -> bool {
        !self.is_junction() && table.columns.len() <= AI_JUNCTION_MAX_COLUMNS
    }
}

#[derive(Debug, Default)]
pub struct JunctionTableDetector;

impl JunctionTableDetector {
    pub fn new() -> Self {
        Self
    }

    /// Run the deterministic passes for every table. One candidate per table,
    /// in snapshot order.
    pub fn scan(&self, tables: &[TableSchema], index: &NameIndex) -> Vec<JunctionCandidate> {
        tables
            .iter()
            .enumerate()
            .map(|(idx, table)| {
                let mut candidate = JunctionCandidate::new(idx, &table.table_name);
                self.name_pattern_pass(&mut candidate, table, tables, index);
                if !candidate.is_junction() {
                    self.primary_key_pass(&mut candidate, table, tables);
                }
                if candidate.is_junction() {
                    debug!(
                        "Junction table {} references {:?}",
                        table.table_name,
                        candidate
                            .referenced_tables
                            .iter()
                            .map(|r| r.table_name.as_str())
                            .collect::<Vec<_>>()
                    );
                }
                candidate
            })
            .collect()
    }

    fn name_pattern_pass(
        &self,
        candidate: &mut JunctionCandidate,
        table: &TableSchema,
        tables: &[TableSchema],
        index: &NameIndex,
    ) {
        for column in &table.columns {
            let lowered = column.column_name.to_lowercase();
            let Some(token) = REFERENCE_SUFFIXES
                .iter()
                .find_map(|suffix| lowered.strip_suffix(suffix))
            else {
                continue;
            };
            if token.is_empty() {
                continue;
            }

            let resolved = index
                .resolve_physical(token)
                .filter(|idx| *idx != candidate.table)
                .or_else(|| index.resolve_alias(token));

            if let Some(target) = resolved {
                candidate.add_reference(target, &tables[target].table_name, &column.column_name);
            }
        }
    }

    fn primary_key_pass(
        &self,
        candidate: &mut JunctionCandidate,
        table: &TableSchema,
        tables: &[TableSchema],
    ) {
        // Members of a composite key are what a bridge table links through;
        // only a sole single-column key identifies the table itself
        let own_key = match table.primary_keys() {
            [single] => Some(single.as_str()),
            _ => None,
        };

        for column in &table.columns {
            if column.column_name.eq_ignore_ascii_case("id")
                || own_key.map_or(false, |k| k.eq_ignore_ascii_case(&column.column_name))
            {
                continue;
            }

            for (other_idx, other) in tables.iter().enumerate() {
                if other_idx == candidate.table {
                    continue;
                }
                let is_key = other
                    .primary_keys()
                    .iter()
                    .any(|k| k.eq_ignore_ascii_case(&column.column_name));
                if !is_key {
                    continue;
                }
                let compatible = other
                    .column(&column.column_name)
                    .map(|key_column| types_compatible(&column.data_type, &key_column.data_type))
                    .unwrap_or(false);
                if compatible {
                    candidate.add_reference(other_idx, &other.table_name, &column.column_name);
                }
            }
        }
    }
}

/// Apply an AI verdict to a candidate. Accepted only when the model says
/// it is a junction with confidence ≥ 70 and at least two of the named
/// tables resolve to other tables of the snapshot.
pub fn accept_ai_verdict(
    candidate: &mut JunctionCandidate,
    verdict: &AiJunctionVerdict,
    tables: &[TableSchema],
    index: &NameIndex,
) -> bool {
    if !verdict.is_junction || verdict.confidence_percent() < AI_JUNCTION_MIN_CONFIDENCE {
        return false;
    }

    let table = &tables[candidate.table];
    let mut resolved: Vec<(usize, String)> = Vec::new();
    for connected in &verdict.connected_tables {
        let name = connected.table_name();
        let Some(target) = index.resolve(strip_schema_qualifier(name)) else {
            debug!("AI named unknown table '{}' for {}", name, table.table_name);
            continue;
        };
        if target == candidate.table || resolved.iter().any(|(idx, _)| *idx == target) {
            continue;
        }
        let column = connected
            .column()
            .and_then(|c| table.column(c))
            .map(|c| c.column_name.clone())
            .unwrap_or_default();
        resolved.push((target, column));
    }

    if resolved.len() < 2 {
        return false;
    }

    for (target, column) in resolved {
        candidate.add_reference(target, &tables[target].table_name, &column);
    }
    candidate.is_junction()
}

/// `"sales.orders"` → `"orders"`
pub fn strip_schema_qualifier(name: &str) -> &str {
    let name = name.trim();
    let unqualified = name.rsplit('.').next().unwrap_or(name);
    unqualified.trim_matches(|c| c == '"' || c == '`')
}
