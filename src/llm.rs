//! LLM chat collaborator
//!
//! The join engine talks to the model through `ConversationalLlm`: a
//! conversation is initialized once with a system prompt and then receives
//! messages. `LlmClient` implements it against an OpenAI-compatible
//! `/chat/completions` endpoint and keeps per-conversation history.

use crate::error::{ModelerError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// API key that switches the client into offline mode
pub const DUMMY_API_KEY: &str = "dummy-api-key";

/// Upper bound on stored (and re-sent) messages per conversation,
/// system prompt included
pub const MAX_HISTORY_MESSAGES: usize = 9;

/// Reply used in offline mode; valid both as a join list and a junction verdict
const OFFLINE_REPLY: &str =
    r#"{"joins": [], "is_junction": false, "confidence": 0, "connected_tables": []}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[async_trait]
pub trait ConversationalLlm: Send + Sync {
    /// Create a conversation. Calling it again for an existing id is not an error.
    async fn initialize_conversation(&self, conversation_id: &str, system_prompt: &str) -> Result<()>;

    /// Send a user message and return the assistant's raw reply
    async fn send_message(&self, conversation_id: &str, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
    conversations: DashMap<String, Vec<ChatMessage>>,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
            conversations: DashMap::new(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.api_key == DUMMY_API_KEY
    }

    /// Number of messages recorded for a conversation (system prompt included)
    pub fn history_len(&self, conversation_id: &str) -> usize {
        self.conversations
            .get(conversation_id)
            .map(|history| history.len())
            .unwrap_or(0)
    }

    async fn call_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
        });

        // Reasoning models spend tokens before answering
        if self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(4000);
        } else if self.model.starts_with("gpt-4") {
            body["max_completion_tokens"] = serde_json::json!(2000);
        } else {
            body["max_tokens"] = serde_json::json!(2000);
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelerError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModelerError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelerError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Pull the assistant message out of a chat completion body
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(ModelerError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| ModelerError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(ModelerError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| ModelerError::Llm("No content in LLM response".to_string()))?;

    if content.trim().is_empty() {
        return Err(ModelerError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

#[async_trait]
impl ConversationalLlm for LlmClient {
    async fn initialize_conversation(&self, conversation_id: &str, system_prompt: &str) -> Result<()> {
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!("Starting conversation {}", conversation_id);
                vec![ChatMessage::system(system_prompt)]
            });
        Ok(())
    }

    async fn send_message(&self, conversation_id: &str, prompt: &str) -> Result<String> {
        // Snapshot the history; no map guard may live across the HTTP call
        let mut messages = self
            .conversations
            .get(conversation_id)
            .map(|history| history.value().clone())
            .unwrap_or_default();
        messages.push(ChatMessage::user(prompt));

        let reply = if self.is_offline() {
            OFFLINE_REPLY.to_string()
        } else {
            self.call_chat(&messages).await?
        };

        // Append to the live entry; concurrent turns on one conversation must both land
        let turn = [ChatMessage::user(prompt), ChatMessage::assistant(reply.clone())];
        self.conversations
            .entry(conversation_id.to_string())
            .and_modify(|history| {
                history.extend(turn.iter().cloned());
                trim_history(history);
            })
            .or_insert_with(|| turn.to_vec());
        Ok(reply)
    }
}

/// Keep a leading system prompt plus the most recent messages
fn trim_history(history: &mut Vec<ChatMessage>) {
    if history.len() <= MAX_HISTORY_MESSAGES {
        return;
    }
    let pinned = usize::from(history.first().map_or(false, |m| m.role == "system"));
    let excess = history.len() - MAX_HISTORY_MESSAGES;
    history.drain(pinned..pinned + excess);
}
