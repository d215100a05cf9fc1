//! # LLM Client Module
//!
//! ## Purpose
//! Minimal HTTP client for an OpenAI-compatible chat-completions endpoint,
//! used only for query parsing. The [`QueryModel`] trait is the seam between
//! the smart search engine and the network.
//!
//! ## Input/Output Specification
//! - **Input**: System prompt + user message
//! - **Output**: Raw model response content (expected to be JSON)
//! - **Errors**: classified as timeout / service; JSON validation happens in
//!   the caller

use crate::config::SmartSearchConfig;
use crate::errors::{Result, SearchError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Seam for query parsing backends
#[async_trait]
pub trait QueryModel: Send + Sync {
    /// Send one chat completion request and return the raw content of the
    /// first choice
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

/// HTTP client for an OpenAI-compatible chat-completions API
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmClient {
    pub fn new(config: &SmartSearchConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SearchError::LlmNotConfigured {
                details: "no API key configured".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SearchError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl QueryModel for LlmClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_message},
            ],
            // Low temperature for consistent structured output
            "temperature": 0.3,
            "max_tokens": 800,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SearchError::LlmService {
                details: format!("HTTP {}: {}", status, crate::utils::TextUtils::truncate(&detail, 300)),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| SearchError::LlmService {
            details: format!("malformed completion response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SearchError::LlmService {
                details: "completion response contained no choices".to_string(),
            })
    }
}
