// src/provider/mod.rs — Model backend used by the LLM reviewer

pub mod anthropic;
pub mod retry;

use async_trait::async_trait;

use crate::infra::errors::GateError;

/// A single-turn completion backend.
///
/// Errors are classified through `GateError::is_retriable`, which is what
/// `retry::RetryProvider` keys on.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Known per-million-token prices. May be empty.
    fn price_list(&self) -> Vec<ModelPrice>;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GateError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrice {
    pub model: String,
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPrice {
    pub fn new(model: &str, input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            model: model.to_string(),
            input_per_mtok,
            output_per_mtok,
        }
    }
}

/// One review request: a system prompt plus a single user turn.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    /// Output was cut off; the JSON report is almost certainly incomplete.
    MaxTokens,
    StopSequence,
    #[default]
    Unknown,
}
