//! Join suggestions produced by the inference engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pattern tags attached to suggestions
pub mod patterns {
    pub const EXACT_NAME_MATCH: &str = "exact_name_match";
    pub const ID_SUFFIX: &str = "id_suffix";
    pub const SHARED_ID_PREFIX: &str = "shared_id_prefix";
    pub const TABLE_NAME_REFERENCE: &str = "table_name_reference";
    pub const IDENTIFIER_TOKEN: &str = "identifier_token";
    pub const JUNCTION_TABLE: &str = "junction-table";
    pub const AI_POWERED: &str = "ai-powered";
    pub const SEMANTIC_ANALYSIS: &str = "semantic-analysis";
    pub const CONFIRMED_BY_RULES: &str = "confirmed-by-rules";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.4 {
            ConfidenceLevel::Low
        } else if score < 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    /// Lenient parse of an LLM-provided join type; unknown values fall back to INNER
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "LEFT" | "LEFT JOIN" | "LEFT OUTER" | "LEFT OUTER JOIN" => JoinType::Left,
            "RIGHT" | "RIGHT JOIN" | "RIGHT OUTER" | "RIGHT OUTER JOIN" => JoinType::Right,
            _ => JoinType::Inner,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// One side of a proposed join condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub column_type: String,
}

impl ColumnRef {
    /// `schema.table.column`, lowercased; half of a merge key
    pub fn qualified_key(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.column).to_lowercase()
    }
}

/// A proposed join awaiting human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredJoin {
    pub id: Uuid,
    pub left: ColumnRef,
    pub right: ColumnRef,
    /// Always in [0, 1]; `confidence_level` is derived from it
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub reasoning: String,
    pub suggested_join_type: JoinType,
    pub matched_patterns: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub dismissed: bool,
}

impl InferredJoin {
    pub fn new(
        left: ColumnRef,
        right: ColumnRef,
        confidence_score: f64,
        reasoning: impl Into<String>,
        suggested_join_type: JoinType,
        matched_patterns: Vec<String>,
    ) -> Self {
        let confidence_score = confidence_score.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4(),
            left,
            right,
            confidence_score,
            confidence_level: ConfidenceLevel::from_score(confidence_score),
            reasoning: reasoning.into(),
            suggested_join_type,
            matched_patterns,
            created_at: Utc::now(),
            applied: false,
            dismissed: false,
        }
    }

    /// Update the score and keep the level consistent with it
    pub fn set_confidence(&mut self, score: f64) {
        self.confidence_score = score.clamp(0.0, 1.0);
        self.confidence_level = ConfidenceLevel::from_score(self.confidence_score);
    }

    pub fn add_pattern(&mut self, pattern: &str) {
        if !self.has_pattern(pattern) {
            self.matched_patterns.push(pattern.to_string());
        }
    }

    pub fn has_pattern(&self, pattern: &str) -> bool {
        self.matched_patterns.iter().any(|p| p == pattern)
    }

    /// Key of the (left, right) pair in its written direction
    pub fn key(&self) -> String {
        format!("{}|{}", self.left.qualified_key(), self.right.qualified_key())
    }

    pub fn reversed_key(&self) -> String {
        format!("{}|{}", self.right.qualified_key(), self.left.qualified_key())
    }

    /// Same key regardless of which side is written first
    pub fn unordered_key(&self) -> String {
        let key = self.key();
        let reversed = self.reversed_key();
        if key <= reversed {
            key
        } else {
            reversed
        }
    }

    /// `left.table.column = right.table.column`
    pub fn join_condition(&self) -> String {
        format!(
            "{}.{} = {}.{}",
            self.left.table, self.left.column, self.right.table, self.right.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, column: &str) -> ColumnRef {
        ColumnRef {
            schema: "public".to_string(),
            table: table.to_string(),
            column: column.to_string(),
            column_type: "int".to_string(),
        }
    }

    #[test]
    fn test_confidence_level_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.39), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.69), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::High);
    }

    #[test]
    fn test_set_confidence_keeps_level_in_sync() {
        let mut join = InferredJoin::new(
            column("orders", "id"),
            column("order_items", "order_id"),
            0.65,
            "test",
            JoinType::Inner,
            vec![],
        );
        assert_eq!(join.confidence_level, ConfidenceLevel::Medium);
        join.set_confidence(1.4);
        assert_eq!(join.confidence_score, 1.0);
        assert_eq!(join.confidence_level, ConfidenceLevel::High);
    }

    #[test]
    fn test_unordered_key_is_direction_free() {
        let a = InferredJoin::new(
            column("orders", "id"),
            column("Order_Items", "order_id"),
            0.9,
            "a",
            JoinType::Inner,
            vec![],
        );
        let b = InferredJoin::new(
            column("order_items", "ORDER_ID"),
            column("orders", "id"),
            0.9,
            "b",
            JoinType::Inner,
            vec![],
        );
        assert_eq!(a.unordered_key(), b.unordered_key());
        assert_eq!(a.key(), b.reversed_key());
    }

    #[test]
    fn test_serialized_enums() {
        assert_eq!(serde_json::to_string(&JoinType::Left).unwrap(), "\"LEFT\"");
        assert_eq!(serde_json::to_string(&ConfidenceLevel::High).unwrap(), "\"high\"");
        assert_eq!(JoinType::parse_lenient("left outer join"), JoinType::Left);
        assert_eq!(JoinType::parse_lenient("full"), JoinType::Inner);
    }
}
