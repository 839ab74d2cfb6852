//! Join inference engine
//!
//! Runs one inference pass over an owned schema snapshot:
//! 1. Build the name index (physical + logical names)
//! 2. Detect junction tables, optionally asking the semantic suggester
//!    about small ambiguous tables
//! 3. Match junction ↔ referenced pairs, then every other table pair
//! 4. Optionally collect AI join suggestions
//! 5. Merge and rank
//!
//! Semantic failures are logged and degrade to rules only; `infer_joins`
//! itself never fails.

use crate::junction::{accept_ai_verdict, JunctionCandidate, JunctionTableDetector};
use crate::matcher::{PairwiseMatcher, TableView};
use crate::merge::SuggestionMerger;
use crate::naming::NameIndex;
use crate::schema::TableSchema;
use crate::semantic::{NoopSemanticSuggester, SemanticJoinSuggester};
use crate::suggestion::{patterns, InferredJoin};
use itertools::Itertools;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of every conversation id the engine derives
pub const CONVERSATION_PREFIX: &str = "join-inference";

#[derive(Debug, Clone, Default)]
pub struct InferenceOptions {
    /// Ask the semantic suggester for joins and junction verdicts
    pub use_ai: bool,
    /// Conversation used for LLM calls. When unset each snapshot gets its
    /// own conversation, so prompts about one data source never reach another.
    pub conversation_id: Option<String>,
}

impl InferenceOptions {
    pub fn with_ai() -> Self {
        Self {
            use_ai: true,
            conversation_id: None,
        }
    }

    /// Use `conversation_id` unless the caller already chose one
    pub fn or_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        if self.conversation_id.is_none() {
            self.conversation_id = Some(conversation_id.into());
        }
        self
    }

    /// The caller's conversation id, or one derived from the snapshot's
    /// qualified table names
    pub fn conversation_for(&self, tables: &[TableSchema]) -> String {
        if let Some(id) = &self.conversation_id {
            return id.clone();
        }
        let mut hasher = DefaultHasher::new();
        for table in tables {
            table.schema.to_lowercase().hash(&mut hasher);
            table.table_name.to_lowercase().hash(&mut hasher);
        }
        format!("{}:{:016x}", CONVERSATION_PREFIX, hasher.finish())
    }
}

pub struct JoinInferenceEngine {
    matcher: PairwiseMatcher,
    detector: JunctionTableDetector,
    merger: SuggestionMerger,
    semantic: Arc<dyn SemanticJoinSuggester>,
}

impl JoinInferenceEngine {
    pub fn new(semantic: Arc<dyn SemanticJoinSuggester>) -> Self {
        Self {
            matcher: PairwiseMatcher::new(),
            detector: JunctionTableDetector::new(),
            merger: SuggestionMerger::new(),
            semantic,
        }
    }

    /// Engine without a semantic suggester; `use_ai` has no effect
    pub fn rules_only() -> Self {
        Self::new(Arc::new(NoopSemanticSuggester))
    }

    /// Infer joins for a snapshot, ranked by confidence
    pub async fn infer_joins(
        &self,
        tables: &[TableSchema],
        options: &InferenceOptions,
    ) -> Vec<InferredJoin> {
        if tables.len() < 2 {
            debug!("Fewer than two tables, nothing to join");
            return Vec::new();
        }

        let index = NameIndex::build(tables);
        let mut candidates = self.detector.scan(tables, &index);
        let conversation_id = options.conversation_for(tables);

        if options.use_ai {
            self.classify_ambiguous_tables(&mut candidates, tables, &index, &conversation_id)
                .await;
        }

        let rule_suggestions = self.rule_based_suggestions(tables, &index, &candidates);

        let ai_suggestions = if options.use_ai {
            match self
                .semantic
                .suggest_joins(tables, &conversation_id)
                .await
            {
                Ok(joins) => joins,
                Err(e) => {
                    warn!("AI join suggestion failed, continuing with rules only: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let ai_count = ai_suggestions.len();
        let rule_count = rule_suggestions.len();
        let merged = self.merger.merge(ai_suggestions, rule_suggestions);
        info!(
            "Inferred {} joins across {} tables ({} AI, {} rule-based)",
            merged.len(),
            tables.len(),
            ai_count,
            rule_count
        );
        merged
    }

    /// AI pass of junction detection. One failing call only affects its table.
    async fn classify_ambiguous_tables(
        &self,
        candidates: &mut [JunctionCandidate],
        tables: &[TableSchema],
        index: &NameIndex,
        conversation_id: &str,
    ) {
        for candidate in candidates.iter_mut() {
            let table = &tables[candidate.table];
            if !candidate.eligible_for_ai(table) {
                continue;
            }

            match self
                .semantic
                .classify_junction(table, tables, conversation_id)
                .await
            {
                Ok(Some(verdict)) => {
                    if accept_ai_verdict(candidate, &verdict, tables, index) {
                        info!("AI classified {} as a junction table", table.table_name);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "AI junction classification failed for {}: {}",
                    table.table_name, e
                ),
            }
        }
    }

    /// Junction joins first, then every remaining table pair
    pub fn rule_based_suggestions(
        &self,
        tables: &[TableSchema],
        index: &NameIndex,
        candidates: &[JunctionCandidate],
    ) -> Vec<InferredJoin> {
        let view = |idx: usize| TableView {
            table: &tables[idx],
            singular_names: index.singular_names(idx),
        };
        let is_junction = |idx: usize| {
            candidates
                .get(idx)
                .map_or(false, JunctionCandidate::is_junction)
        };

        let mut suggestions = Vec::new();
        let mut resolved: HashSet<(usize, usize)> = HashSet::new();

        for candidate in candidates.iter().filter(|c| c.is_junction()) {
            for reference in &candidate.referenced_tables {
                let pair = ordered_pair(candidate.table, reference.table);
                if !resolved.insert(pair) {
                    continue;
                }
                let junction = &tables[candidate.table];
                let referenced = &tables[reference.table];

                if let Some(found) = self.matcher.best_match(view(candidate.table), view(reference.table)) {
                    let mut join = found.to_join(junction, referenced);
                    join.reasoning = format!(
                        "Junction table join: {} connects multiple tables via {}",
                        junction.table_name, found.left.column_name
                    );
                    join.add_pattern(patterns::JUNCTION_TABLE);
                    suggestions.push(join);
                } else {
                    debug!(
                        "No column match between junction {} and {}",
                        junction.table_name, referenced.table_name
                    );
                }
            }
        }

        for (left, right) in (0..tables.len()).tuple_combinations() {
            if is_junction(left) && is_junction(right) {
                continue;
            }
            if resolved.contains(&ordered_pair(left, right)) {
                continue;
            }
            if let Some(found) = self.matcher.best_match(view(left), view(right)) {
                suggestions.push(found.to_join(&tables[left], &tables[right]));
            }
        }

        suggestions
    }
}

fn ordered_pair(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelerError, Result};
    use crate::schema::ColumnSchema;
    use crate::semantic::response::{AiJunctionVerdict, ConnectedTable};
    use crate::suggestion::{ColumnRef, JoinType};
    use crate::junction::AI_JUNCTION_MAX_COLUMNS;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails every join request; says "junction" for tables named `links`
    struct FlakySuggester {
        classify_calls: AtomicUsize,
    }

    #[async_trait]
    impl SemanticJoinSuggester for FlakySuggester {
        async fn suggest_joins(&self, _tables: &[TableSchema], _id: &str) -> Result<Vec<InferredJoin>> {
            Err(ModelerError::Llm("timeout".to_string()))
        }

        async fn classify_junction(
            &self,
            table: &TableSchema,
            _tables: &[TableSchema],
            _id: &str,
        ) -> Result<Option<AiJunctionVerdict>> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            if table.table_name != "links" {
                return Err(ModelerError::Llm("rate limited".to_string()));
            }
            Ok(Some(AiJunctionVerdict {
                is_junction: true,
                confidence: 85.0,
                connected_tables: vec![
                    ConnectedTable::Detailed { table: "members".into(), column: Some("member_ref".into()) },
                    ConnectedTable::Detailed { table: "groups".into(), column: Some("group_ref".into()) },
                ],
                reasoning: "bridge".to_string(),
            }))
        }
    }

    /// Always proposes one fixed join
    struct FixedSuggester(InferredJoin);

    #[async_trait]
    impl SemanticJoinSuggester for FixedSuggester {
        async fn suggest_joins(&self, _tables: &[TableSchema], _id: &str) -> Result<Vec<InferredJoin>> {
            Ok(vec![self.0.clone()])
        }

        async fn classify_junction(
            &self,
            _table: &TableSchema,
            _tables: &[TableSchema],
            _id: &str,
        ) -> Result<Option<AiJunctionVerdict>> {
            Ok(None)
        }
    }

    /// Records the conversation id of every call
    #[derive(Default)]
    struct RecordingSuggester {
        conversations: Mutex<Vec<String>>,
    }

    impl RecordingSuggester {
        fn seen(&self) -> Vec<String> {
            self.conversations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SemanticJoinSuggester for RecordingSuggester {
        async fn suggest_joins(&self, _tables: &[TableSchema], id: &str) -> Result<Vec<InferredJoin>> {
            self.conversations.lock().unwrap().push(id.to_string());
            Ok(Vec::new())
        }

        async fn classify_junction(
            &self,
            _table: &TableSchema,
            _tables: &[TableSchema],
            id: &str,
        ) -> Result<Option<AiJunctionVerdict>> {
            self.conversations.lock().unwrap().push(id.to_string());
            Ok(None)
        }
    }

    fn orders_and_items() -> Vec<TableSchema> {
        vec![
            TableSchema::new("public", "orders", vec![
                ColumnSchema::new("id", "int"),
                ColumnSchema::new("total", "numeric"),
            ]),
            TableSchema::new("public", "order_items", vec![
                ColumnSchema::new("item_no", "int"),
                ColumnSchema::new("order_id", "int"),
            ]),
        ]
    }

    #[tokio::test]
    async fn test_rules_only_inference() {
        let engine = JoinInferenceEngine::rules_only();
        let joins = engine
            .infer_joins(&orders_and_items(), &InferenceOptions::with_ai())
            .await;

        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].join_condition(), "orders.id = order_items.order_id");
        assert!(joins[0].has_pattern(patterns::ID_SUFFIX));
        assert_eq!(joins[0].suggested_join_type, JoinType::Inner);
    }

    #[tokio::test]
    async fn test_single_table_yields_nothing() {
        let engine = JoinInferenceEngine::rules_only();
        let tables = vec![orders_and_items().remove(0)];
        assert!(engine.infer_joins(&tables, &InferenceOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_ai_failures_are_isolated() {
        let tables = vec![
            TableSchema::new("public", "members", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "groups", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "links", vec![
                ColumnSchema::new("member_ref", "int"),
                ColumnSchema::new("group_ref", "int"),
            ]),
        ];
        let suggester = Arc::new(FlakySuggester { classify_calls: AtomicUsize::new(0) });
        let engine = JoinInferenceEngine::new(suggester.clone());
        let joins = engine.infer_joins(&tables, &InferenceOptions::with_ai()).await;

        // all three tables are narrow and unresolved, so each was asked
        assert_eq!(suggester.classify_calls.load(Ordering::SeqCst), 3);
        // links became a junction despite the failures on the other tables
        assert_eq!(joins.len(), 3);
        assert_eq!(joins[0].join_condition(), "members.id = groups.id");
        assert!(joins[1].has_pattern(patterns::JUNCTION_TABLE));
        assert_eq!(
            joins[1].reasoning,
            "Junction table join: links connects multiple tables via member_ref"
        );
        assert_eq!(joins[2].join_condition(), "links.group_ref = groups.id");
    }

    #[tokio::test]
    async fn test_wide_tables_are_never_classified() {
        let readings = (1..=AI_JUNCTION_MAX_COLUMNS + 1)
            .map(|n| ColumnSchema::new(format!("reading_{}", n), "int"))
            .collect();
        let tables = vec![
            TableSchema::new("public", "members", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "groups", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "links", vec![
                ColumnSchema::new("member_ref", "int"),
                ColumnSchema::new("group_ref", "int"),
            ]),
            TableSchema::new("public", "sensor_log", readings),
        ];
        let suggester = Arc::new(FlakySuggester { classify_calls: AtomicUsize::new(0) });
        let engine = JoinInferenceEngine::new(suggester.clone());
        let joins = engine.infer_joins(&tables, &InferenceOptions::with_ai()).await;

        // members, groups and links were asked; the 11-column table was not
        assert_eq!(suggester.classify_calls.load(Ordering::SeqCst), 3);
        assert!(joins.iter().all(|j| j.left.table != "sensor_log" && j.right.table != "sensor_log"));
    }

    #[tokio::test]
    async fn test_conversation_ids_are_scoped_per_snapshot() {
        let suggester = Arc::new(RecordingSuggester::default());
        let engine = JoinInferenceEngine::new(suggester.clone());
        let options = InferenceOptions::with_ai();

        let sales = orders_and_items();
        let mut hr = orders_and_items();
        for table in hr.iter_mut() {
            table.schema = "hr".to_string();
        }

        engine.infer_joins(&sales, &options).await;
        engine.infer_joins(&sales, &options).await;
        engine.infer_joins(&hr, &options).await;

        let seen = suggester.seen();
        // two classify calls plus one join request per run
        assert_eq!(seen.len(), 9);
        let sales_id = options.conversation_for(&sales);
        let hr_id = options.conversation_for(&hr);
        assert!(sales_id.starts_with("join-inference:"));
        assert_ne!(sales_id, hr_id);
        assert!(seen[..6].iter().all(|id| *id == sales_id));
        assert!(seen[6..].iter().all(|id| *id == hr_id));
    }

    #[test]
    fn test_explicit_conversation_is_kept() {
        let tables = orders_and_items();
        let options = InferenceOptions {
            use_ai: true,
            conversation_id: Some("modeler-42".to_string()),
        };
        assert_eq!(options.conversation_for(&tables), "modeler-42");

        let options = options.or_conversation("join-inference:ds7:default");
        assert_eq!(options.conversation_id.as_deref(), Some("modeler-42"));

        let options = InferenceOptions::with_ai().or_conversation("join-inference:ds7:default");
        assert_eq!(options.conversation_for(&tables), "join-inference:ds7:default");
    }

    #[tokio::test]
    async fn test_ai_suggestion_confirmed_by_rules() {
        let tables = orders_and_items();
        let ai_join = InferredJoin::new(
            ColumnRef {
                schema: "public".into(),
                table: "order_items".into(),
                column: "order_id".into(),
                column_type: "int".into(),
            },
            ColumnRef {
                schema: "public".into(),
                table: "orders".into(),
                column: "id".into(),
                column_type: "int".into(),
            },
            0.85,
            "line items belong to orders",
            JoinType::Left,
            vec![patterns::AI_POWERED.to_string(), patterns::SEMANTIC_ANALYSIS.to_string()],
        );
        let engine = JoinInferenceEngine::new(Arc::new(FixedSuggester(ai_join)));

        let joins = engine.infer_joins(&tables, &InferenceOptions::with_ai()).await;
        assert_eq!(joins.len(), 1);
        assert!((joins[0].confidence_score - 0.90).abs() < 1e-9);
        assert_eq!(joins[0].suggested_join_type, JoinType::Left);
        assert!(joins[0].has_pattern(patterns::CONFIRMED_BY_RULES));

        // without AI the fixed suggester is never consulted
        let joins = engine.infer_joins(&tables, &InferenceOptions::default()).await;
        assert!(!joins[0].has_pattern(patterns::AI_POWERED));
    }

    #[test]
    fn test_junction_pairs_are_not_rematched() {
        let tables = vec![
            TableSchema::new("public", "orders", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "products", vec![ColumnSchema::new("id", "uuid")]),
            TableSchema::new("public", "order_products", vec![
                ColumnSchema::new("order_id", "int"),
                ColumnSchema::new("product_id", "uuid"),
            ]),
        ];
        let engine = JoinInferenceEngine::rules_only();
        let index = NameIndex::build(&tables);
        let candidates = JunctionTableDetector::new().scan(&tables, &index);
        let joins = engine.rule_based_suggestions(&tables, &index, &candidates);

        assert_eq!(joins.len(), 2);
        for join in &joins {
            assert!(join.has_pattern(patterns::JUNCTION_TABLE));
            assert_eq!(join.left.table, "order_products");
        }
        assert_eq!(
            joins[0].reasoning,
            "Junction table join: order_products connects multiple tables via order_id"
        );
    }
}
