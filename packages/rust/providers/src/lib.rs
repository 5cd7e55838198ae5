//! Search and language-model providers.
//!
//! The pipeline depends only on the [`SearchProvider`] and [`LanguageModel`]
//! traits. Production implementations live here; tests substitute their own.

mod duckduckgo;
mod llm;
mod openai;
mod search;

pub use duckduckgo::{DDG_HTML_URL, DuckDuckGoProvider};
pub use llm::{Completion, LLM_REQUEST_FAILED, LanguageModel, OutputSchema, unavailable_message};
pub use openai::OpenAiClient;
pub use search::SearchProvider;
