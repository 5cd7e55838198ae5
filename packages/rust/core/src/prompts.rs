//! Prompt templates for the four language-model stages.
//!
//! Templates use `{name}` placeholders. Rendering is a single left-to-right
//! pass: substituted values are inserted verbatim and never rescanned, so a
//! brace inside a page or query can never turn into a placeholder.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use websearch_shared::{PromptsConfig, Result, WebSearchError, expand_home};

const DEFAULT_EXPAND_QUERIES: &str = "\
You are a research assistant planning a web search.
Write a list of diverse search engine queries that together cover the information need below.
Vary wording, scope and angle (recent developments, regional detail, background, opposing views).
Each query should be short and work well on a general web search engine.

Information need: {query}";

const DEFAULT_RELEVANCE: &str = "\
Rate how useful the search result below is for answering the query.
Use an integer from 0 (irrelevant) to 5 (directly answers the query).
Reply with the integer only.

Query: {query}

Search result:
{content}";

const DEFAULT_SUMMARIZE: &str = "\
Summarize the web page content below, keeping only facts that help answer the query.
Preserve figures, dates and names. Do not add information that is not in the content.

Query: {query}

Content:
{content}";

const DEFAULT_MERGE: &str = "\
Combine the page summaries below into one complete answer to the query.
Resolve overlaps, note disagreements between sources, and refer to sources by URL where useful.

Query: {query}

Summaries:
{summaries}";

/// The four stage templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default = "default_expand_queries")]
    pub expand_queries: String,
    #[serde(default = "default_relevance")]
    pub relevance: String,
    #[serde(default = "default_summarize")]
    pub summarize: String,
    #[serde(default = "default_merge")]
    pub merge: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            expand_queries: default_expand_queries(),
            relevance: default_relevance(),
            summarize: default_summarize(),
            merge: default_merge(),
        }
    }
}

fn default_expand_queries() -> String {
    DEFAULT_EXPAND_QUERIES.into()
}
fn default_relevance() -> String {
    DEFAULT_RELEVANCE.into()
}
fn default_summarize() -> String {
    DEFAULT_SUMMARIZE.into()
}
fn default_merge() -> String {
    DEFAULT_MERGE.into()
}

impl PromptTemplates {
    /// Load overrides from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WebSearchError::io(path, e))?;
        let templates: Self = toml::from_str(&content).map_err(|e| {
            WebSearchError::config(format!("failed to parse prompts {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "loaded prompt templates");
        Ok(templates)
    }

    /// Built-in templates, or the overrides named in `[prompts]`.
    pub fn from_config(config: &PromptsConfig) -> Result<Self> {
        match &config.file {
            Some(file) => Self::load(&expand_home(file)),
            None => Ok(Self::default()),
        }
    }

    /// Check that every template mentions the placeholders its stage supplies.
    pub fn validate(&self) -> Result<()> {
        let required: [(&str, &str, &[&str]); 4] = [
            ("expand_queries", &self.expand_queries, &["query"]),
            ("relevance", &self.relevance, &["query", "content"]),
            ("summarize", &self.summarize, &["query", "content"]),
            ("merge", &self.merge, &["query", "summaries"]),
        ];

        let mut missing = Vec::new();
        for (name, template, needed) in required {
            let present = placeholders(template);
            for placeholder in needed {
                if !present.contains(placeholder) {
                    missing.push(format!("{name} lacks {{{placeholder}}}"));
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WebSearchError::validation(format!(
                "invalid prompt templates: {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

enum Token<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Split a template into literal text and `{name}` placeholders.
/// `{{` and `}}` are literal braces; anything else brace-shaped is literal.
fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                tokens.push(Token::Literal(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let name_len = bytes[i + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                let close = i + 1 + name_len;
                if name_len > 0 && bytes.get(close) == Some(&b'}') {
                    tokens.push(Token::Literal(&template[literal_start..i]));
                    tokens.push(Token::Placeholder(&template[i + 1..close]));
                    i = close + 1;
                    literal_start = i;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    tokens.push(Token::Literal(&template[literal_start..]));
    tokens
}

/// Names of the placeholders a template uses.
pub fn placeholders(template: &str) -> Vec<&str> {
    tokenize(template)
        .into_iter()
        .filter_map(|t| match t {
            Token::Placeholder(name) => Some(name),
            Token::Literal(_) => None,
        })
        .collect()
}

/// Substitute `values` into `template`.
///
/// Unknown placeholders are left as written.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Placeholder(name) => match values.iter().find(|(k, _)| *k == name) {
                Some((_, value)) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
    }
    out
}
