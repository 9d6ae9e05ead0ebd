//! Specialist backed by an OpenAI-compatible chat completion endpoint
//!
//! Works with OpenAI, Gemini's OpenAI endpoint, Ollama and similar servers.
//! Error text keeps the HTTP status so failures can be categorized, and
//! leaves out the URL so a port number cannot be mistaken for a status code.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::Specialist;

pub struct OpenAiCompatSpecialist {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    instructions: String,
}

impl std::fmt::Debug for OpenAiCompatSpecialist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatSpecialist")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("instructions", &format!("{} chars", self.instructions.len()))
            .finish()
    }
}

impl OpenAiCompatSpecialist {
    /// `base_url` includes the API version, e.g. `https://api.openai.com/v1`
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        instructions: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens,
            instructions: instructions.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, composed_input: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.instructions.is_empty() {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: self.instructions.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user".to_string(),
            content: composed_input.to_string(),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
        }
    }

    fn reply_text(response: ChatCompletionResponse) -> Result<String> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("malformed chat completion response: no choices"))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl Specialist for OpenAiCompatSpecialist {
    async fn invoke(&self, composed_input: &str) -> Result<String> {
        let body = self.request_body(composed_input);
        debug!(
            "Chat completion request: model={}, input={} chars",
            self.model,
            composed_input.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("connection to chat completion endpoint failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "chat completion request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        Self::reply_text(parsed)
    }
}

// ── wire types ──

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Clone, Deserialize)]
struct WireReply {
    content: Option<String>,
}
