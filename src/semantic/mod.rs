//! Semantic (LLM-backed) join suggestions
//!
//! The deterministic engine only sees the `SemanticJoinSuggester`
//! capability, so it can run against `NoopSemanticSuggester` in tests and
//! rules-only deployments. `LlmJoinSuggester` adapts any
//! `ConversationalLlm` to it.

pub mod prompts;
pub mod response;

use crate::error::{ModelerError, Result};
use crate::llm::ConversationalLlm;
use crate::schema::TableSchema;
use crate::suggestion::InferredJoin;
use async_trait::async_trait;
use response::AiJunctionVerdict;
use std::sync::Arc;
use tracing::{debug, info};

#[async_trait]
pub trait SemanticJoinSuggester: Send + Sync {
    /// Propose joins across the whole snapshot. Returned suggestions only
    /// reference known tables and columns.
    async fn suggest_joins(
        &self,
        tables: &[TableSchema],
        conversation_id: &str,
    ) -> Result<Vec<InferredJoin>>;

    /// Ask whether `table` is a junction. `None` means no opinion.
    async fn classify_junction(
        &self,
        table: &TableSchema,
        tables: &[TableSchema],
        conversation_id: &str,
    ) -> Result<Option<AiJunctionVerdict>>;
}

/// Suggester that never suggests anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSemanticSuggester;

#[async_trait]
impl SemanticJoinSuggester for NoopSemanticSuggester {
    async fn suggest_joins(&self, _tables: &[TableSchema], _conversation_id: &str) -> Result<Vec<InferredJoin>> {
        Ok(Vec::new())
    }

    async fn classify_junction(
        &self,
        _table: &TableSchema,
        _tables: &[TableSchema],
        _conversation_id: &str,
    ) -> Result<Option<AiJunctionVerdict>> {
        Ok(None)
    }
}

pub struct LlmJoinSuggester {
    llm: Arc<dyn ConversationalLlm>,
}

impl LlmJoinSuggester {
    pub fn new(llm: Arc<dyn ConversationalLlm>) -> Self {
        Self { llm }
    }

    async fn ensure_conversation(&self, conversation_id: &str) -> Result<()> {
        match self
            .llm
            .initialize_conversation(conversation_id, prompts::DATA_MODELER_SYSTEM_PROMPT)
            .await
        {
            Err(ModelerError::Llm(msg)) if msg.to_lowercase().contains("already exists") => {
                debug!("Conversation {} already exists", conversation_id);
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl SemanticJoinSuggester for LlmJoinSuggester {
    async fn suggest_joins(
        &self,
        tables: &[TableSchema],
        conversation_id: &str,
    ) -> Result<Vec<InferredJoin>> {
        if tables.len() < 2 {
            return Ok(Vec::new());
        }

        self.ensure_conversation(conversation_id).await?;
        let raw = self
            .llm
            .send_message(conversation_id, &prompts::join_suggestion_prompt(tables))
            .await?;

        let proposals = response::parse_join_proposals(&raw)?;
        let proposed = proposals.len();
        let joins = response::resolve_proposals(proposals, tables);
        info!(
            "AI proposed {} joins, {} reference known columns",
            proposed,
            joins.len()
        );
        Ok(joins)
    }

    async fn classify_junction(
        &self,
        table: &TableSchema,
        tables: &[TableSchema],
        conversation_id: &str,
    ) -> Result<Option<AiJunctionVerdict>> {
        self.ensure_conversation(conversation_id).await?;
        let raw = self
            .llm
            .send_message(
                conversation_id,
                &prompts::junction_classification_prompt(table, tables),
            )
            .await?;
        response::parse_junction_verdict(&raw).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;
    use std::sync::Mutex;

    /// Replies with canned answers in order and records prompts
    struct ScriptedLlm {
        init_error: Option<String>,
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            Self {
                init_error: None,
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConversationalLlm for ScriptedLlm {
        async fn initialize_conversation(&self, _id: &str, _system_prompt: &str) -> Result<()> {
            match &self.init_error {
                Some(msg) => Err(ModelerError::Llm(msg.clone())),
                None => Ok(()),
            }
        }

        async fn send_message(&self, _id: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ModelerError::Llm("no scripted reply".to_string()))
        }
    }

    fn tables() -> Vec<TableSchema> {
        vec![
            TableSchema::new("public", "customers", vec![ColumnSchema::new("id", "int")]),
            TableSchema::new("public", "orders", vec![ColumnSchema::new("customer_id", "int")]),
        ]
    }

    #[tokio::test]
    async fn test_suggest_joins_from_fenced_reply() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "```json\n[{\"left_table\": \"public.customers\", \"left_column\": \"id\", \"right_table\": \"orders\", \"right_column\": \"customer_id\", \"confidence_score\": 85, \"reasoning\": \"FK\", \"join_type\": \"INNER\"}]\n```",
        ]));
        let suggester = LlmJoinSuggester::new(llm.clone());
        let joins = suggester.suggest_joins(&tables(), "conv").await.unwrap();

        assert_eq!(joins.len(), 1);
        assert!((joins[0].confidence_score - 0.85).abs() < 1e-9);
        assert!(llm.prompts.lock().unwrap()[0].contains("Table public.orders"));
    }

    #[tokio::test]
    async fn test_already_exists_is_not_an_error() {
        let mut llm = ScriptedLlm::new(&["[]"]);
        llm.init_error = Some("Conversation conv already exists".to_string());
        let suggester = LlmJoinSuggester::new(Arc::new(llm));
        assert!(suggester.suggest_joins(&tables(), "conv").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_failure_propagates_to_caller() {
        let mut llm = ScriptedLlm::new(&["[]"]);
        llm.init_error = Some("connection refused".to_string());
        let suggester = LlmJoinSuggester::new(Arc::new(llm));
        assert!(suggester.suggest_joins(&tables(), "conv").await.is_err());
    }

    #[tokio::test]
    async fn test_classify_junction() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"is_junction": true, "confidence": 80, "connected_tables": ["customers", "orders"]}"#,
        ]));
        let suggester = LlmJoinSuggester::new(llm);
        let tables = tables();
        let verdict = suggester
            .classify_junction(&tables[1], &tables, "conv")
            .await
            .unwrap()
            .unwrap();
        assert!(verdict.is_junction);
        assert_eq!(verdict.connected_tables.len(), 2);
    }
}
