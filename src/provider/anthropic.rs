// src/provider/anthropic.rs — Anthropic Messages API backend

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Completion, CompletionRequest, ModelPrice, ModelProvider, StopReason, TokenUsage};
use crate::infra::errors::GateError;

const PROVIDER: &str = "anthropic";
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Fallback wait when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct AnthropicProvider {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: MESSAGES_URL.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Send requests somewhere else (a proxy or a local stub server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }
}

fn provider_error(message: String, retriable: bool) -> GateError {
    GateError::Provider {
        provider: PROVIDER.into(),
        message,
        retriable,
    }
}

/// Messages API body. The review instructions are the same for every lesson
/// in a batch, so the system block is marked for prompt caching.
fn request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [{ "role": "user", "content": request.prompt }],
    });
    if let Some(ref system) = request.system {
        body["system"] = json!([{
            "type": "text",
            "text": system,
            "cache_control": { "type": "ephemeral" }
        }]);
    }
    body
}

fn completion_from(body: &Value) -> Completion {
    let text = body["content"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect::<String>();

    let count = |key: &str| body["usage"][key].as_u64().unwrap_or(0) as u32;
    let usage = TokenUsage {
        input_tokens: count("input_tokens"),
        output_tokens: count("output_tokens"),
        cache_read_tokens: count("cache_read_input_tokens"),
        cache_write_tokens: count("cache_creation_input_tokens"),
    };

    let stop_reason = match body["stop_reason"].as_str() {
        Some("end_turn") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::Unknown,
    };

    Completion {
        text,
        usage,
        stop_reason,
    }
}

/// Seconds from a `retry-after` header, if it holds a plain integer.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Milliseconds to wait after a 429.
fn rate_limit_wait_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    retry_after_secs(headers)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
        .saturating_mul(1000)
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        PROVIDER
    }

    fn price_list(&self) -> Vec<ModelPrice> {
        vec![
            ModelPrice::new("claude-sonnet-4-5-20250929", 3.0, 15.0),
            ModelPrice::new("claude-opus-4-20250514", 15.0, 75.0),
            ModelPrice::new("claude-haiku-3-5-20241022", 0.8, 4.0),
        ]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GateError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|e| provider_error(e.to_string(), e.is_timeout() || e.is_connect()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GateError::RateLimited {
                provider: PROVIDER.into(),
                retry_after_ms: rate_limit_wait_ms(response.headers()),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            // 5xx (including 529 overloaded) is worth another try; 4xx is not
            return Err(provider_error(
                format!("HTTP {}: {}", status, detail),
                status.is_server_error(),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| provider_error(format!("unreadable response body: {}", e), false))?;
        Ok(completion_from(&body))
    }
}
