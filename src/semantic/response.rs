//! Parse-and-validate step for LLM answers
//!
//! LLM output is never trusted as an untyped blob: the JSON payload is
//! extracted (optionally from a fenced code block), decoded into typed
//! structs, and every proposal is resolved against the known schema before
//! it becomes an `InferredJoin`. Malformed items are dropped one by one.

use crate::error::{ModelerError, Result};
use crate::junction::strip_schema_qualifier;
use crate::naming::clean_logical_name;
use crate::schema::TableSchema;
use crate::suggestion::{patterns, ColumnRef, InferredJoin, JoinType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Keys under which models tend to wrap a list of joins
const LIST_KEYS: &[&str] = &["joins", "suggestions", "relationships", "results"];

/// One join proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiJoinProposal {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
    /// 0–100 as requested, though some models answer on a 0–1 scale
    pub confidence_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub join_type: Option<String>,
}

/// A table the model says a junction connects: either a bare name or
/// `{"table": ..., "column": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectedTable {
    Name(String),
    Detailed {
        table: String,
        #[serde(default)]
        column: Option<String>,
    },
}

impl ConnectedTable {
    pub fn table_name(&self) -> &str {
        match self {
            ConnectedTable::Name(name) => name,
            ConnectedTable::Detailed { table, .. } => table,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            ConnectedTable::Name(_) => None,
            ConnectedTable::Detailed { column, .. } => column.as_deref(),
        }
    }
}

/// The model's answer to "is this a junction table?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiJunctionVerdict {
    pub is_junction: bool,
    #[serde(alias = "confidence_score")]
    pub confidence: f64,
    #[serde(default)]
    pub connected_tables: Vec<ConnectedTable>,
    #[serde(default)]
    pub reasoning: String,
}

impl AiJunctionVerdict {
    /// Confidence on the 0–100 scale
    pub fn confidence_percent(&self) -> f64 {
        if self.confidence <= 1.0 {
            self.confidence * 100.0
        } else {
            self.confidence
        }
    }
}

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("valid regex"))
}

/// Locate the JSON payload in a model reply
///
/// A fenced block wins when it parses. Otherwise each `{` or `[` is tried in
/// turn, spanning to the last matching closer, and the first span that
/// parses is returned. When none parses the first span is returned so the
/// caller reports the parse error.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    if let Some(captures) = fenced_block_regex().captures(trimmed) {
        if let Some(body) = captures.get(1) {
            let body = body.as_str().trim();
            if (body.starts_with('{') || body.starts_with('[')) && parses(body) {
                return Some(body);
            }
        }
    }

    let mut first_span = None;
    for (start, open) in trimmed.char_indices().filter(|(_, c)| *c == '{' || *c == '[') {
        let close = if open == '{' { '}' } else { ']' };
        let end = match trimmed.rfind(close) {
            Some(end) if end > start => end,
            _ => continue,
        };
        let span = &trimmed[start..=end];
        if parses(span) {
            return Some(span);
        }
        first_span.get_or_insert(span);
    }
    first_span
}

fn parses(candidate: &str) -> bool {
    serde_json::from_str::<Value>(candidate).is_ok()
}

fn parse_payload(raw: &str) -> Result<Value> {
    let json = extract_json(raw)
        .ok_or_else(|| ModelerError::AiResponse("No JSON found in LLM response".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| ModelerError::AiResponse(format!("Failed to parse LLM response: {}", e)))
}

/// Decode join proposals. Fails only when no JSON list can be found at all;
/// individual malformed items are skipped.
pub fn parse_join_proposals(raw: &str) -> Result<Vec<AiJoinProposal>> {
    let items = match parse_payload(raw)? {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(key) = LIST_KEYS.iter().find(|k| map.get(**k).map_or(false, Value::is_array)) {
                match map.remove(*key) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            } else if map.contains_key("left_table") {
                vec![Value::Object(map)]
            } else {
                return Err(ModelerError::AiResponse(
                    "LLM response contains no join list".to_string(),
                ));
            }
        }
        other => {
            return Err(ModelerError::AiResponse(format!(
                "Unexpected JSON in LLM response: {}",
                other
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<AiJoinProposal>(item) {
            Ok(proposal) => Some(proposal),
            Err(e) => {
                debug!("Dropping malformed AI join proposal: {}", e);
                None
            }
        })
        .collect())
}

pub fn parse_junction_verdict(raw: &str) -> Result<AiJunctionVerdict> {
    serde_json::from_value(parse_payload(raw)?)
        .map_err(|e| ModelerError::AiResponse(format!("Invalid junction verdict: {}", e)))
}

/// Case-insensitive table lookup on physical, then cleaned logical name
fn find_table<'a>(tables: &'a [TableSchema], name: &str) -> Option<&'a TableSchema> {
    let name = strip_schema_qualifier(name);
    tables
        .iter()
        .find(|t| t.table_name.eq_ignore_ascii_case(name))
        .or_else(|| {
            tables.iter().find(|t| {
                t.display_name().eq_ignore_ascii_case(name)
                    || clean_logical_name(t.display_name()).eq_ignore_ascii_case(name)
            })
        })
}

fn column_ref(table: &TableSchema, column: &str) -> Option<ColumnRef> {
    let column = table.column(column.trim())?;
    Some(ColumnRef {
        schema: table.schema.clone(),
        table: table.table_name.clone(),
        column: column.column_name.clone(),
        column_type: column.data_type.clone(),
    })
}

/// Turn proposals into suggestions, dropping any that name an unknown table
/// or column
pub fn resolve_proposals(proposals: Vec<AiJoinProposal>, tables: &[TableSchema]) -> Vec<InferredJoin> {
    proposals
        .into_iter()
        .filter_map(|proposal| {
            let left = find_table(tables, &proposal.left_table)
                .and_then(|t| column_ref(t, &proposal.left_column));
            let right = find_table(tables, &proposal.right_table)
                .and_then(|t| column_ref(t, &proposal.right_column));

            let (Some(left), Some(right)) = (left, right) else {
                debug!(
                    "Dropping AI join {}.{} = {}.{}: unknown table or column",
                    proposal.left_table,
                    proposal.left_column,
                    proposal.right_table,
                    proposal.right_column
                );
                return None;
            };

            if !proposal.confidence_score.is_finite() || proposal.confidence_score < 0.0 {
                debug!("Dropping AI join with confidence {}", proposal.confidence_score);
                return None;
            }
            let score = if proposal.confidence_score > 1.0 {
                proposal.confidence_score / 100.0
            } else {
                proposal.confidence_score
            };

            let reasoning = if proposal.reasoning.trim().is_empty() {
                "Suggested by semantic analysis".to_string()
            } else {
                proposal.reasoning
            };
            let join_type = proposal
                .join_type
                .as_deref()
                .map(JoinType::parse_lenient)
                .unwrap_or(JoinType::Inner);

            Some(InferredJoin::new(
                left,
                right,
                score,
                reasoning,
                join_type,
                vec![
                    patterns::AI_POWERED.to_string(),
                    patterns::SEMANTIC_ANALYSIS.to_string(),
                ],
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;

    fn tables() -> Vec<TableSchema> {
        vec![
            TableSchema::new("sales", "customers", vec![
                ColumnSchema::new("id", "int"),
                ColumnSchema::new("email", "text"),
            ]),
            TableSchema::new("sales", "tbl_77", vec![
                ColumnSchema::new("Customer_ID", "int"),
            ])
            .with_display_name("Orders.csv"),
        ]
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let raw = "Here you go:\n```json\n[{\"a\": 1}]\n```\nThanks";
        assert_eq!(extract_json(raw), Some("[{\"a\": 1}]"));

        let raw = "Sure! {\"is_junction\": false, \"confidence\": 10} done";
        assert_eq!(extract_json(raw), Some("{\"is_junction\": false, \"confidence\": 10}"));

        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_extract_json_skips_bracketed_prose() {
        let raw = "Here are the joins [see below]: {\"joins\": []}";
        assert_eq!(extract_json(raw), Some("{\"joins\": []}"));
        assert!(parse_join_proposals(raw).unwrap().is_empty());

        // nothing parses: the first span is handed on and fails to parse
        let raw = "Result: {\"joins\": [oops]}";
        assert_eq!(extract_json(raw), Some("{\"joins\": [oops]}"));
        assert!(matches!(parse_join_proposals(raw), Err(ModelerError::AiResponse(_))));
    }

    #[test]
    fn test_parse_wrapped_list_and_drop_malformed() {
        let raw = r#"{"joins": [
            {"left_table": "customers", "left_column": "id", "right_table": "orders",
             "right_column": "customer_id", "confidence_score": 85, "reasoning": "FK", "join_type": "LEFT"},
            {"left_table": "customers", "left_column": "id", "right_table": "orders",
             "right_column": "customer_id", "confidence_score": "high"},
            {"left_table": "customers"}
        ]}"#;
        let proposals = parse_join_proposals(raw).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].confidence_score, 85.0);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_join_proposals("I could not find any joins."),
            Err(ModelerError::AiResponse(_))
        ));
        assert!(parse_join_proposals(r#"{"message": "none"}"#).is_err());
        assert!(parse_join_proposals("[]").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_proposals() {
        let proposals = vec![
            AiJoinProposal {
                left_table: "sales.CUSTOMERS".into(),
                left_column: "ID".into(),
                right_table: "Orders".into(),
                right_column: "customer_id".into(),
                confidence_score: 85.0,
                reasoning: String::new(),
                join_type: Some("left join".into()),
            },
            AiJoinProposal {
                left_table: "customers".into(),
                left_column: "id".into(),
                right_table: "invoices".into(),
                right_column: "customer_id".into(),
                confidence_score: 0.8,
                reasoning: "made up".into(),
                join_type: None,
            },
            AiJoinProposal {
                left_table: "customers".into(),
                left_column: "phone".into(),
                right_table: "tbl_77".into(),
                right_column: "customer_id".into(),
                confidence_score: 0.8,
                reasoning: "bad column".into(),
                join_type: None,
            },
        ];
        let joins = resolve_proposals(proposals, &tables());

        assert_eq!(joins.len(), 1);
        let join = &joins[0];
        assert_eq!(join.left.table, "customers");
        assert_eq!(join.left.column, "id");
        assert_eq!(join.right.table, "tbl_77");
        assert_eq!(join.right.column, "Customer_ID");
        assert_eq!(join.right.schema, "sales");
        assert!((join.confidence_score - 0.85).abs() < 1e-9);
        assert_eq!(join.suggested_join_type, JoinType::Left);
        assert!(join.has_pattern(patterns::AI_POWERED));
        assert!(join.has_pattern(patterns::SEMANTIC_ANALYSIS));
    }

    #[test]
    fn test_parse_junction_verdict() {
        let raw = "```\n{\"is_junction\": true, \"confidence_score\": 82, \"connected_tables\": [\"a\", {\"table\": \"b\", \"column\": \"b_ref\"}]}\n```";
        let verdict = parse_junction_verdict(raw).unwrap();
        assert!(verdict.is_junction);
        assert_eq!(verdict.confidence_percent(), 82.0);
        assert_eq!(verdict.connected_tables[1].column(), Some("b_ref"));
        assert_eq!(verdict.connected_tables[0].table_name(), "a");
    }
}
