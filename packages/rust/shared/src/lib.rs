//! Shared types, error model, and configuration for websearch.
//!
//! This crate is the foundation depended on by all other websearch crates.
//! It provides:
//! - [`WebSearchError`], the unified error type
//! - Domain types ([`SearchResult`], [`SearchHit`], [`ExpandedQueries`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, FetchConfig, FetchSection, FilterConfig, LlmConfig, MAX_RELEVANCE,
    PipelineConfig, PromptsConfig, ProxyConfig, SearchConfig, TokenBudgets, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, WebSearchError};
pub use types::{ExpandedQueries, SearchHit, SearchResult};
