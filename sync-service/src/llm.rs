//! Chat-completion client for the text-to-structured-data transformer.
//!
//! The transformer is a black box: role-tagged messages in, one text blob
//! out. Whether that blob is the JSON we asked for is the extraction
//! engine's problem, not this module's.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::json;

/// One role-tagged message of a completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Invokes the transformer and returns its raw text response
#[allow(async_fn_in_trait)]
pub trait ChatCompleter {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

impl OpenAiChat {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

impl ChatCompleter for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": temperature,
            "messages": messages,
        });

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("completion HTTP request failed")?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .context("completion response decode failed")?;

        if !status.is_success() {
            return Err(anyhow!("completion API returned {}: {}", status, payload));
        }

        content_from_response(&payload)
            .ok_or_else(|| anyhow!("completion response has no message content: {}", payload))
    }
}

/// Pull the first choice's message text out of a chat completions payload
fn content_from_response(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
