//! Pairwise column matcher
//!
//! For a pair of tables every column × column combination is scored against
//! an ordered rule table. The first applicable rule sets the confidence of a
//! column pair; the best column pair (≥ 0.6) becomes the suggestion for the
//! table pair. Type compatibility is checked before any rule is consulted.
//!
//! New rules are added as rows of `MATCH_RULES`, not as new branches.

use crate::naming::compact_form;
use crate::schema::{ColumnSchema, TableSchema};
use crate::suggestion::{patterns, ColumnRef, InferredJoin, JoinType};
use crate::types::types_compatible;

/// Minimum confidence for a rule-based suggestion
pub const MIN_CONFIDENCE: f64 = 0.6;

const IDENTIFIER_TOKENS: &[&str] = &["uuid", "code", "key", "reference", "ref"];

/// A table as seen by the matcher: the schema plus its singular names
/// (physical and logical)
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    pub table: &'a TableSchema,
    pub singular_names: &'a [String],
}

/// Column pair under evaluation. Column names are lowercased.
#[derive(Debug)]
pub struct ColumnPair<'a> {
    pub left_table: &'a str,
    pub right_table: &'a str,
    pub left_column: String,
    pub right_column: String,
    pub left_singulars: &'a [String],
    pub right_singulars: &'a [String],
}

impl ColumnPair<'_> {
    /// Apply a check in both directions: (left, right) and (right, left)
    fn either_way(&self, check: impl Fn(&str, &str, &[String]) -> bool) -> bool {
        check(self.left_column.as_str(), self.right_column.as_str(), self.left_singulars)
            || check(self.right_column.as_str(), self.left_column.as_str(), self.right_singulars)
    }
}

/// One row of the confidence cascade
pub struct MatchRule {
    pub tag: &'static str,
    pub confidence: f64,
    pub applies: fn(&ColumnPair) -> bool,
    pub reasoning: fn(&ColumnPair) -> String,
}

fn exact_name(pair: &ColumnPair) -> bool {
    pair.left_column == pair.right_column
}

/// `id` in table A against `<singular A>_id`
fn id_suffix(pair: &ColumnPair) -> bool {
    pair.either_way(|id_col, other, singulars| {
        id_col == "id" && singulars.iter().any(|s| other == format!("{}_id", s))
    })
}

/// `<x>_id` against `<x>_id` with separators ignored (`order_item_id` / `orderitem_id`)
fn shared_id_prefix(pair: &ColumnPair) -> bool {
    match (
        pair.left_column.strip_suffix("_id"),
        pair.right_column.strip_suffix("_id"),
    ) {
        (Some(left), Some(right)) => {
            let left = compact_form(left);
            !left.is_empty() && left == compact_form(right)
        }
        _ => false,
    }
}

/// `id` in table A against any column containing A's singular name
fn table_name_reference(pair: &ColumnPair) -> bool {
    pair.either_way(|id_col, other, singulars| {
        id_col == "id"
            && other != "id"
            && singulars.iter().any(|s| !s.is_empty() && other.contains(s.as_str()))
    })
}

/// `code` in table A against `<singular A>_code` (also uuid, key, reference, ref)
fn identifier_token(pair: &ColumnPair) -> bool {
    pair.either_way(|token_col, other, singulars| {
        IDENTIFIER_TOKENS.contains(&token_col)
            && singulars
                .iter()
                .any(|s| other == format!("{}_{}", s, token_col))
    })
}

pub static MATCH_RULES: [MatchRule; 5] = [
    MatchRule {
        tag: patterns::EXACT_NAME_MATCH,
        confidence: 0.95,
        applies: exact_name,
        reasoning: |p| {
            format!(
                "Column '{}' has the same name in {} and {}",
                p.left_column, p.left_table, p.right_table
            )
        },
    },
    MatchRule {
        tag: patterns::ID_SUFFIX,
        confidence: 0.90,
        applies: id_suffix,
        reasoning: |p| {
            format!(
                "Primary key pattern: {}.{} is referenced by {}.{}",
                p.left_table, p.left_column, p.right_table, p.right_column
            )
        },
    },
    MatchRule {
        tag: patterns::SHARED_ID_PREFIX,
        confidence: 0.85,
        applies: shared_id_prefix,
        reasoning: |p| {
            format!(
                "Both {}.{} and {}.{} are identifiers with the same prefix",
                p.left_table, p.left_column, p.right_table, p.right_column
            )
        },
    },
    MatchRule {
        tag: patterns::TABLE_NAME_REFERENCE,
        confidence: 0.75,
        applies: table_name_reference,
        reasoning: |p| {
            format!(
                "Column name references the other table: {}.{} ↔ {}.{}",
                p.left_table, p.left_column, p.right_table, p.right_column
            )
        },
    },
    MatchRule {
        tag: patterns::IDENTIFIER_TOKEN,
        confidence: 0.70,
        applies: identifier_token,
        reasoning: |p| {
            format!(
                "Shared business identifier: {}.{} ↔ {}.{}",
                p.left_table, p.left_column, p.right_table, p.right_column
            )
        },
    },
];

/// Result of scoring a single column pair
#[derive(Debug, Clone)]
pub struct ColumnMatch<'a> {
    pub left: &'a ColumnSchema,
    pub right: &'a ColumnSchema,
    pub confidence: f64,
    pub tag: &'static str,
    pub reasoning: String,
}

impl ColumnMatch<'_> {
    /// Build the suggestion for this match between `left` and `right` tables
    pub fn to_join(&self, left: &TableSchema, right: &TableSchema) -> InferredJoin {
        InferredJoin::new(
            ColumnRef {
                schema: left.schema.clone(),
                table: left.table_name.clone(),
                column: self.left.column_name.clone(),
                column_type: self.left.data_type.clone(),
            },
            ColumnRef {
                schema: right.schema.clone(),
                table: right.table_name.clone(),
                column: self.right.column_name.clone(),
                column_type: self.right.data_type.clone(),
            },
            self.confidence,
            self.reasoning.clone(),
            JoinType::Inner,
            vec![self.tag.to_string()],
        )
    }
}

pub struct PairwiseMatcher {
    min_confidence: f64,
}

impl Default for PairwiseMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PairwiseMatcher {
    pub fn new() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
        }
    }

    /// Score one column pair. Incompatible types short-circuit to `None`.
    pub fn evaluate<'a>(
        &self,
        left: TableView<'_>,
        left_column: &'a ColumnSchema,
        right: TableView<'_>,
        right_column: &'a ColumnSchema,
    ) -> Option<ColumnMatch<'a>> {
        if !types_compatible(&left_column.data_type, &right_column.data_type) {
            return None;
        }

        let pair = ColumnPair {
            left_table: &left.table.table_name,
            right_table: &right.table.table_name,
            left_column: left_column.column_name.to_lowercase(),
            right_column: right_column.column_name.to_lowercase(),
            left_singulars: left.singular_names,
            right_singulars: right.singular_names,
        };

        MATCH_RULES
            .iter()
            .find(|rule| (rule.applies)(&pair))
            .map(|rule| ColumnMatch {
                left: left_column,
                right: right_column,
                confidence: rule.confidence,
                tag: rule.tag,
                reasoning: (rule.reasoning)(&pair),
            })
    }

    /// Confidence of a column pair; 0 when types are incompatible or no rule applies
    pub fn confidence(
        &self,
        left: TableView<'_>,
        left_column: &ColumnSchema,
        right: TableView<'_>,
        right_column: &ColumnSchema,
    ) -> f64 {
        self.evaluate(left, left_column, right, right_column)
            .map(|m| m.confidence)
            .unwrap_or(0.0)
    }

    /// Best column match between two tables. Ties keep the first pair in
    /// enumeration order (left columns outer, right columns inner).
    pub fn best_match<'a>(
        &self,
        left: TableView<'a>,
        right: TableView<'a>,
    ) -> Option<ColumnMatch<'a>> {
        let mut best: Option<ColumnMatch<'a>> = None;

        for left_column in &left.table.columns {
            for right_column in &right.table.columns {
                let Some(candidate) = self.evaluate(left, left_column, right, right_column) else {
                    continue;
                };
                if candidate.confidence < self.min_confidence {
                    continue;
                }
                let better = best
                    .as_ref()
                    .map_or(true, |current| candidate.confidence > current.confidence);
                if better {
                    best = Some(candidate);
                }
            }
        }

        best
    }
}
