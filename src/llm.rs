//! Answering-model client.
//!
//! Defines the [`ChatModel`] trait (a single `invoke` over an ordered list
//! of role-tagged messages) plus an OpenAI-compatible
//! `/v1/chat/completions` implementation. The answering call is a single
//! attempt with no retry; callers needing responsiveness wrap the stage with
//! their own timeout policy.
//!
//! Also provides [`strip_reasoning`], which removes `<think>...</think>`
//! spans some models emit before their final answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

/// One role-tagged message sent to the answering model.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// The answering model. One call per answering stage, no internal retry.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat client for any OpenAI-compatible chat completions endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let endpoint = config.endpoint.trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            bail!("model.endpoint must start with http:// or https://");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/v1/chat/completions", endpoint),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completions API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))
    }
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Remove `<think>...</think>` reasoning spans from a model response and
/// trim the remainder. An unclosed `<think>` drops everything after it.
pub fn strip_reasoning(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        match rest[open..].find(THINK_CLOSE) {
            Some(close) => {
                rest = &rest[open + close + THINK_CLOSE.len()..];
            }
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_reasoning_span() {
        let raw = "<think>step by step...</think>The total is 42.";
        assert_eq!(strip_reasoning(raw), "The total is 42.");
    }

    #[test]
    fn strips_multiline_span() {
        let raw = "<think>line one\nline two</think>\n\nAnswer text.";
        assert_eq!(strip_reasoning(raw), "Answer text.");
    }

    #[test]
    fn strips_multiple_spans() {
        let raw = "<think>a</think>first<think>b</think> second";
        assert_eq!(strip_reasoning(raw), "first second");
    }

    #[test]
    fn leaves_plain_responses_untouched() {
        assert_eq!(strip_reasoning("Plain answer."), "Plain answer.");
    }

    #[test]
    fn unclosed_span_drops_trailing_text() {
        let raw = "Visible.<think>never closed";
        assert_eq!(strip_reasoning(raw), "Visible.");
    }
}
