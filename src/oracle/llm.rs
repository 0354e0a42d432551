//! OpenAI-compatible chat-completions oracle.
//!
//! Communicates via REST API: `POST {endpoint}/chat/completions` with
//! `response_format = json_object`, then parses the message content
//! against the extraction or resolution schema.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{OracleConfig, duration_or};
use crate::oracle::prompt::{Prompt, extraction_prompt, resolution_prompt};
use crate::oracle::sanitize::detect_suspicious_patterns;
use crate::oracle::{ExtractionOracle, ExtractionRequest, ResolutionOracle, ResolutionRequest};
use crate::order::{ParsedOrder, ResolutionBucketSet};
use crate::utils::preview;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Language-model oracle implementing both extraction and resolution.
pub struct LlmOracle {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(duration_or(&config.timeout, Duration::from_secs(30)))
            .build()
            .context("failed to build oracle HTTP client")?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    /// Send one prompt and return the raw JSON text of the reply.
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response: ChatResponse = request
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned error status")?
            .json()
            .await
            .context("failed to parse chat completion response as JSON")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    /// Parse the model's JSON, tolerating a fenced code block around it.
    fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed);
        serde_json::from_str(body.trim())
            .with_context(|| format!("oracle reply does not match schema: {}", preview(raw, 120)))
    }
}

#[async_trait]
impl ExtractionOracle for LlmOracle {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ParsedOrder> {
        let flagged = detect_suspicious_patterns(&request.text);
        if !flagged.is_empty() {
            warn!(patterns = ?flagged, "Suspicious content in utterance");
        }
        let raw = self.complete(&extraction_prompt(request)).await?;
        let order: ParsedOrder = Self::parse_reply(&raw)?;
        debug!(
            restaurant = ?order.restaurant,
            items = order.items.len(),
            "LLM extraction complete"
        );
        Ok(order)
    }
}

/// A reply naming none of these is not an answer, even if it parses.
const RESOLUTION_BUCKETS: &[&str] = &["confident_matches", "clarification_needed", "not_found"];

#[async_trait]
impl ResolutionOracle for LlmOracle {
    async fn resolve(&self, request: &ResolutionRequest) -> Result<ResolutionBucketSet> {
        let raw = self.complete(&resolution_prompt(request)).await?;
        let value: serde_json::Value = Self::parse_reply(&raw)?;
        let has_bucket = value
            .as_object()
            .is_some_and(|o| RESOLUTION_BUCKETS.iter().any(|k| o.contains_key(*k)));
        if !has_bucket {
            bail!("oracle reply has no resolution buckets: {}", preview(&raw, 120));
        }
        let resolution: ResolutionBucketSet = serde_json::from_value(value)
            .with_context(|| format!("oracle reply does not match schema: {}", preview(&raw, 120)))?;
        debug!(summary = ?resolution.summary(), "LLM resolution complete");
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ParsedOrderLine;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle(endpoint: &str) -> LlmOracle {
        LlmOracle::new(&OracleConfig {
            endpoint: endpoint.to_string(),
            api_key: "sk-test".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn extraction_parses_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(reply(
                r#"{"restaurant":"McDonald's","items":[{"item":"big mac","quantity":2}]}"#,
            ))
            .mount(&server)
            .await;

        let order = oracle(&server.uri())
            .extract(&ExtractionRequest {
                text: "two big macs from mcdonalds".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(order.restaurant.as_deref(), Some("McDonald's"));
        assert_eq!(order.items, vec![ParsedOrderLine::new("big mac", 2)]);
    }

    #[tokio::test]
    async fn resolution_accepts_fenced_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply(
                "```json\n{\"confident_matches\":[],\"clarification_needed\":[],\"not_found\":[{\"requested_item\":\"pizza\",\"quantity\":1}]}\n```",
            ))
            .mount(&server)
            .await;

        let resolution = oracle(&server.uri())
            .resolve(&ResolutionRequest::default())
            .await
            .unwrap();
        assert_eq!(resolution.not_found.len(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("I'd be happy to help with your order!"))
            .mount(&server)
            .await;

        let err = oracle(&server.uri())
            .resolve(&ResolutionRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match schema"));
    }

    #[tokio::test]
    async fn reply_without_buckets_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("{}"))
            .mount(&server)
            .await;

        let err = oracle(&server.uri())
            .resolve(&ResolutionRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no resolution buckets"));
    }

    #[tokio::test]
    async fn missing_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        assert!(
            oracle(&server.uri())
                .extract(&ExtractionRequest::default())
                .await
                .is_err()
        );
    }
}
