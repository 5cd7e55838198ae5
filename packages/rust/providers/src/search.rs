//! Search provider trait definition

use async_trait::async_trait;
use websearch_shared::{Result, SearchHit};

/// A web search backend.
///
/// Implementations return hits in provider-ranked order. Errors are the
/// caller's to absorb; the pipeline treats a failed search as no hits.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`, returning at most `max_results` hits.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
