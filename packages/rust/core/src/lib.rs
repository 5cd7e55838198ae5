//! Core pipeline orchestration for websearch.
//!
//! This crate ties together search providers, relevance scoring, polite
//! fetching, and summarization into one end-to-end run (`Pipeline::run`).

pub mod pipeline;
pub mod prompts;

pub use pipeline::{
    NO_CONTENT, NO_RELEVANT_RESULTS, NO_SEARCH_RESULTS, Pipeline, PipelineOutput,
    ProgressReporter, RunStatus, SilentProgress,
};
pub use prompts::{PromptTemplates, placeholders, render};
