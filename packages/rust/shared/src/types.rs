//! Core domain types threaded through the search pipeline.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// A raw candidate returned by a search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// The unit of state carried from search collection to the final answer.
///
/// Created with `relevance = 0` and no text; the relevance stage assigns the
/// score once, and the summarization stage produces a new value carrying
/// `full_text` (a preview of the fetched content) and `summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The expanded query that first surfaced this URL.
    pub source_query: String,
    pub title: String,
    /// Unique within one pipeline run.
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub relevance: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SearchResult {
    /// Build a fresh result from a provider hit.
    pub fn from_hit(source_query: &str, hit: SearchHit) -> Self {
        Self {
            source_query: source_query.to_string(),
            title: hit.title,
            url: hit.url,
            snippet: hit.snippet,
            relevance: 0,
            full_text: None,
            summary: None,
        }
    }

    /// Copy of this result with the relevance score set.
    pub fn with_relevance(&self, relevance: i32) -> Self {
        Self {
            relevance,
            ..self.clone()
        }
    }

    /// Copy of this result carrying a content preview and its summary.
    pub fn summarized(&self, full_text: String, summary: String) -> Self {
        Self {
            full_text: Some(full_text),
            summary: Some(summary),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// ExpandedQueries
// ---------------------------------------------------------------------------

/// Structured output of the query expansion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedQueries {
    pub queries: Vec<String>,
}

impl ExpandedQueries {
    /// Schema name sent with structured completion requests.
    pub const SCHEMA_NAME: &'static str = "expanded_queries";

    /// JSON schema describing this type for strict structured output.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["queries"],
            "additionalProperties": false
        })
    }

    /// Parse a structured completion, keeping non-blank queries in order.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        let parsed: Self = serde_json::from_value(value).ok()?;
        let queries: Vec<String> = parsed
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        Some(Self { queries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: "Title".into(),
            url: url.into(),
            snippet: "Snippet".into(),
        }
    }

    #[test]
    fn result_from_hit_starts_unscored() {
        let result = SearchResult::from_hit("rust async", hit("https://a.test/"));
        assert_eq!(result.source_query, "rust async");
        assert_eq!(result.relevance, 0);
        assert!(result.full_text.is_none());
        assert!(result.summary.is_none());
    }

    #[test]
    fn summarized_copies_metadata() {
        let scored = SearchResult::from_hit("q", hit("https://a.test/")).with_relevance(4);
        let done = scored.summarized("preview".into(), "summary".into());
        assert_eq!(done.url, scored.url);
        assert_eq!(done.relevance, 4);
        assert_eq!(done.summary.as_deref(), Some("summary"));
        assert!(scored.summary.is_none());
    }

    #[test]
    fn result_json_omits_missing_text() {
        let result = SearchResult::from_hit("q", hit("https://a.test/"));
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(!json.contains("full_text"));
        assert!(json.contains("\"relevance\":0"));
    }

    #[test]
    fn expanded_queries_drop_blank_entries() {
        let value = serde_json::json!({ "queries": ["  a ", "", "b"] });
        let parsed = ExpandedQueries::from_value(value).expect("parse");
        assert_eq!(parsed.queries, vec!["a", "b"]);
    }

    #[test]
    fn expanded_queries_reject_wrong_shape() {
        assert!(ExpandedQueries::from_value(serde_json::json!({ "items": [] })).is_none());
        assert!(ExpandedQueries::from_value(serde_json::json!("text")).is_none());
    }
}
