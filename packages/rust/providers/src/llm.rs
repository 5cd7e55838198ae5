//! Language-model capability trait and its result types.

use async_trait::async_trait;
use serde_json::Value;

/// Text returned for a call that failed at the provider or transport.
pub const LLM_REQUEST_FAILED: &str = "LLM request failed.";

/// Text returned when no API key is configured.
pub fn unavailable_message(api_key_env: &str) -> String {
    format!("LLM unavailable (missing {api_key_env}).")
}

/// Outcome of a free-text completion.
///
/// `Degraded` carries a fixed failure message instead of model output.
/// Callers that tolerate degraded answers can use [`Completion::into_text`]
/// and treat both variants alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Degraded(String),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(t) | Self::Degraded(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(t) | Self::Degraded(t) => t,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// A named JSON schema requested for structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// A language model reachable in free-text and structured modes.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` as free text. Never fails; failures come back as
    /// [`Completion::Degraded`].
    async fn call_text(&self, prompt: &str, max_tokens: u32) -> Completion;

    /// Complete `prompt` as JSON matching `schema`. `None` on any failure.
    async fn call_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        max_tokens: u32,
    ) -> Option<Value>;
}
