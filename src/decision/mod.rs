//! AI-assisted decision pipeline
//!
//! Builds a deterministic prompt from the account picture, sends it to the
//! reasoning service with retry, and validates the strict-JSON reply before
//! anything downstream may act on it.

mod engine;
mod prompt;

pub use engine::{DecisionAction, DecisionEngine, TradeDecision};
pub use prompt::{build_prompt, PromptInput};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Free-text in, free-text out. The live client talks to a chat-completions
/// endpoint; tests substitute a canned implementation.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Live chat-completions client for the reasoning service
pub struct GrokClient {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl GrokClient {
    pub fn new(url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            url: url.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ReasoningService for GrokClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": 500,
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send reasoning request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("reasoning service returned {}: {}", status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse reasoning response envelope")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("reasoning response had no choices"))?;

        debug!("reasoning response: {}", content);
        Ok(content)
    }
}
