//! Six-stage search pipeline: expand → search → score → fetch → summarize → merge.
//!
//! Stages run strictly in order. Inside a stage every work item runs
//! concurrently and the stage waits for all of them before the next begins.
//! Nothing inside a run returns an error: failed items are dropped or take a
//! conservative default, and two empty intermediate sets end the run early.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use websearch_cache::ContentCache;
use websearch_fetcher::{Fetcher, build_client};
use websearch_policy::{RobotsChecker, UrlFilter};
use websearch_providers::{Completion, LanguageModel, OutputSchema, SearchProvider};
use websearch_shared::{
    AppConfig, ExpandedQueries, FetchConfig, PipelineConfig, Result, SearchHit, SearchResult,
};

use crate::prompts::{PromptTemplates, render};

/// Answer text when the search stage collected nothing.
pub const NO_SEARCH_RESULTS: &str = "No search results found.";

/// Answer text when no result passed the relevance threshold.
pub const NO_RELEVANT_RESULTS: &str = "No relevant results found.";

/// Answer text when no page produced content to summarize.
pub const NO_CONTENT: &str = "No content available to generate answer.";

/// Characters of page content kept in a result's preview.
const PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The merge call produced an answer.
    Answered,
    /// Search returned nothing usable.
    NoSearchResults,
    /// Nothing met the relevance threshold.
    NoRelevantResults,
    /// No page could be fetched and summarized.
    NoContent,
    /// The merge call failed; the answer is the failure message.
    AnswerDegraded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::NoSearchResults => "no_search_results",
            Self::NoRelevantResults => "no_relevant_results",
            Self::NoContent => "no_content",
            Self::AnswerDegraded => "answer_degraded",
        }
    }
}

/// Summarized results and the final answer of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub results: Vec<SearchResult>,
    pub answer: String,
    pub status: RunStatus,
}

impl PipelineOutput {
    fn terminal(answer: &str, status: RunStatus) -> Self {
        Self {
            results: Vec::new(),
            answer: answer.to_string(),
            status,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called when a stage finishes with `count` surviving items.
    fn stage_done(&self, name: &str, count: usize);
    /// Called when the run completes.
    fn done(&self, output: &PipelineOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage_done(&self, _name: &str, _count: usize) {}
    fn done(&self, _output: &PipelineOutput) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The search orchestrator.
///
/// Owns the fetcher's per-host rate state and the robots.txt cache, so two
/// pipelines in one process never share politeness state.
pub struct Pipeline {
    config: PipelineConfig,
    prompts: PromptTemplates,
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LanguageModel>,
    fetcher: Fetcher,
    robots: RobotsChecker,
    cache: Option<ContentCache>,
    filter: UrlFilter,
    client: Client,
}

impl Pipeline {
    /// Build a pipeline from configuration and providers.
    ///
    /// This is the only fallible step: invalid configuration, unreadable or
    /// invalid prompt templates, an uncreatable cache directory, or a bad
    /// proxy/header value all surface here.
    pub fn new(
        app: &AppConfig,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        app.validate()?;

        let prompts = PromptTemplates::from_config(&app.prompts)?;
        prompts.validate()?;

        let cache = app.cache_dir().map(ContentCache::open).transpose()?;

        let fetch_config = FetchConfig::from(app);
        let client = build_client(&fetch_config, None)?;
        let robots = RobotsChecker::new(fetch_config.robots_timeout);
        let fetcher = Fetcher::new(fetch_config)?;

        info!(
            search = search.name(),
            cache = cache.is_some(),
            disallowed = app.filter.disallowed_domains.len(),
            "pipeline ready"
        );

        Ok(Self {
            config: PipelineConfig::from(app),
            prompts,
            search,
            llm,
            fetcher,
            robots,
            cache,
            filter: UrlFilter::new(&app.filter.disallowed_domains),
            client,
        })
    }

    pub fn cache(&self) -> Option<&ContentCache> {
        self.cache.as_ref()
    }

    /// Run all six stages for `query`.
    pub async fn run(&self, query: &str) -> PipelineOutput {
        self.run_with_progress(query, &SilentProgress).await
    }

    /// Run all six stages, reporting stage transitions to `progress`.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn run_with_progress(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
    ) -> PipelineOutput {
        let start = Instant::now();
        info!("starting pipeline");

        // --- Stage 1: Query expansion ---
        progress.phase("Expanding query");
        let queries = self.expand_queries(query).await;
        progress.stage_done("Expanding query", queries.len());

        // --- Stage 2: Search & collect ---
        progress.phase("Searching");
        let collected = self.collect_results(&queries).await;
        progress.stage_done("Searching", collected.len());
        if collected.is_empty() {
            error!("no search results found");
            return finish(PipelineOutput::terminal(NO_SEARCH_RESULTS, RunStatus::NoSearchResults), progress);
        }

        // --- Stage 3: Relevance scoring ---
        progress.phase("Scoring relevance");
        let relevant = self.score_relevance(query, collected).await;
        progress.stage_done("Scoring relevance", relevant.len());
        if relevant.is_empty() {
            error!("no relevant results after filtering");
            return finish(
                PipelineOutput::terminal(NO_RELEVANT_RESULTS, RunStatus::NoRelevantResults),
                progress,
            );
        }

        // --- Stage 4: Content fetch ---
        progress.phase("Fetching pages");
        let contents = self.fetch_contents(&relevant).await;
        progress.stage_done("Fetching pages", contents.iter().flatten().count());

        // --- Stage 5: Summarization ---
        progress.phase("Summarizing");
        let summaries = self.summarize(query, &relevant, contents).await;
        progress.stage_done("Summarizing", summaries.len());

        // --- Stage 6: Merge ---
        progress.phase("Merging summaries");
        let output = self.merge(query, summaries).await;

        info!(
            results = output.results.len(),
            status = output.status.as_str(),
            elapsed_ms = start.elapsed().as_millis(),
            "pipeline complete"
        );
        finish(output, progress)
    }

    /// Stage 1: ask the model for alternative queries.
    /// Falls back to the original query when expansion fails or is empty.
    #[instrument(skip_all)]
    pub async fn expand_queries(&self, query: &str) -> Vec<String> {
        let prompt = render(&self.prompts.expand_queries, &[("query", query)]);
        let schema = OutputSchema::new(ExpandedQueries::SCHEMA_NAME, ExpandedQueries::json_schema());

        let expanded = self
            .llm
            .call_structured(&prompt, &schema, self.config.tokens.expand_queries)
            .await
            .and_then(ExpandedQueries::from_value)
            .filter(|e| !e.queries.is_empty());

        match expanded {
            Some(mut expanded) => {
                expanded.queries.truncate(self.config.num_queries);
                info!(count = expanded.queries.len(), queries = ?expanded.queries, "expanded queries");
                expanded.queries
            }
            None => {
                warn!("query expansion failed, using original query");
                vec![query.to_string()]
            }
        }
    }

    /// Stage 2: search every query concurrently and merge the hits.
    #[instrument(skip_all, fields(queries = queries.len()))]
    pub async fn collect_results(&self, queries: &[String]) -> Vec<SearchResult> {
        let max_results = self.config.max_results_per_query;
        let searches = queries.iter().map(|q| async move {
            match self.search.search(q, max_results).await {
                Ok(mut hits) => {
                    hits.truncate(max_results);
                    debug!(query = %q, count = hits.len(), "search returned hits");
                    hits
                }
                Err(e) => {
                    warn!(query = %q, provider = self.search.name(), error = %e, "search failed");
                    Vec::new()
                }
            }
        });
        let batches = join_all(searches).await;

        let collected = merge_unique(queries.iter().map(String::as_str).zip(batches), &self.filter);
        info!(count = collected.len(), "collected unique URLs");
        collected
    }

    /// Stage 3: score every result concurrently, keep those at or above the
    /// threshold, best first.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn score_relevance(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let total = results.len();
        let scorings = results.iter().map(|result| async move {
            let content = format!("{}\n{}", result.title, result.snippet);
            let prompt = render(&self.prompts.relevance, &[("query", query), ("content", &content)]);
            let reply = self
                .llm
                .call_text(&prompt, self.config.tokens.relevance)
                .await
                .into_text();
            let score = parse_relevance(&reply).unwrap_or_else(|| {
                warn!(url = %result.url, reply = %reply, "invalid relevance score");
                0
            });
            result.with_relevance(score)
        });
        let scored = join_all(scorings).await;

        let kept = filter_and_rank(scored, self.config.min_relevance);
        info!(
            kept = kept.len(),
            total,
            threshold = self.config.min_relevance,
            "filtered by relevance"
        );
        kept
    }

    /// Stage 4: fetch every result concurrently. The n-th entry of the output
    /// belongs to the n-th input result.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn fetch_contents(&self, results: &[SearchResult]) -> Vec<Option<String>> {
        let fetches = results.iter().enumerate().map(|(i, result)| {
            let proxy = proxy_for(&self.config.proxies, i);
            self.fetcher.fetch_with_cache(
                &result.url,
                &self.client,
                self.cache.as_ref(),
                &self.robots,
                proxy,
            )
        });
        let pages = join_all(fetches).await;

        let fetched = pages.iter().flatten().count();
        info!(fetched, total = results.len(), "fetched content");
        pages
    }

    /// Stage 5: summarize every fetched page concurrently. Results without
    /// content are dropped.
    #[instrument(skip_all)]
    pub async fn summarize(
        &self,
        query: &str,
        results: &[SearchResult],
        contents: Vec<Option<String>>,
    ) -> Vec<SearchResult> {
        let jobs = results
            .iter()
            .zip(contents)
            .filter_map(|(result, content)| content.filter(|c| !c.is_empty()).map(|c| (result, c)))
            .map(|(result, content)| async move {
                let truncated = truncate_at_sentence(&content, self.config.max_content_chars);
                let prompt = render(&self.prompts.summarize, &[("query", query), ("content", &truncated)]);
                let summary = self
                    .llm
                    .call_text(&prompt, self.config.tokens.summarize)
                    .await;
                if summary.is_degraded() {
                    warn!(url = %result.url, "summary degraded");
                }
                result.summarized(content_preview(&content), summary.into_text())
            });
        let summaries = join_all(jobs).await;

        info!(count = summaries.len(), "generated summaries");
        summaries
    }

    /// Stage 6: merge all summaries into one answer.
    #[instrument(skip_all, fields(summaries = summaries.len()))]
    pub async fn merge(&self, query: &str, summaries: Vec<SearchResult>) -> PipelineOutput {
        if summaries.is_empty() {
            warn!("no content to merge");
            return PipelineOutput::terminal(NO_CONTENT, RunStatus::NoContent);
        }

        let block = format_summaries(&summaries);
        let prompt = render(&self.prompts.merge, &[("query", query), ("summaries", &block)]);

        info!("merging summaries into final answer");
        let (answer, status) = match self.llm.call_text(&prompt, self.config.tokens.merge).await {
            Completion::Text(text) => (text, RunStatus::Answered),
            Completion::Degraded(text) => {
                warn!(reason = %text, "merge call degraded");
                (text, RunStatus::AnswerDegraded)
            }
        };

        PipelineOutput {
            results: summaries,
            answer,
            status,
        }
    }
}

fn finish(output: PipelineOutput, progress: &dyn ProgressReporter) -> PipelineOutput {
    progress.done(&output);
    output
}

// ---------------------------------------------------------------------------
// Stage helpers
// ---------------------------------------------------------------------------

/// Merge per-query hits in query order, keeping the first occurrence of each
/// URL and dropping empty or filtered URLs.
pub fn merge_unique<'q, I>(batches: I, filter: &UrlFilter) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (&'q str, Vec<SearchHit>)>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected = Vec::new();

    for (query, hits) in batches {
        for hit in hits {
            if hit.url.is_empty() || seen.contains(&hit.url) {
                continue;
            }
            if !filter.is_allowed(&hit.url) {
                debug!(url = %hit.url, "filtered out disallowed URL");
                continue;
            }
            seen.insert(hit.url.clone());
            collected.push(SearchResult::from_hit(query, hit));
        }
    }

    collected
}

/// Parse a relevance reply as a bare integer.
pub fn parse_relevance(reply: &str) -> Option<i32> {
    reply.trim().parse().ok()
}

/// Keep results scoring at least `min_relevance`, highest first.
/// Equal scores keep their original order.
pub fn filter_and_rank(results: Vec<SearchResult>, min_relevance: i32) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| r.relevance >= min_relevance)
        .collect();
    kept.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    kept
}

/// Round-robin proxy assignment by result index.
fn proxy_for(proxies: &[String], index: usize) -> Option<&str> {
    if proxies.is_empty() {
        None
    } else {
        Some(proxies[index % proxies.len()].as_str())
    }
}

/// Cut `content` to `max_chars` characters. When a cut happens, back up to
/// just after the last period so the prompt does not end mid-sentence.
pub fn truncate_at_sentence(content: &str, max_chars: usize) -> String {
    let Some((cut, _)) = content.char_indices().nth(max_chars) else {
        return content.to_string();
    };
    let head = &content[..cut];
    match head.rfind('.') {
        Some(period) => head[..=period].to_string(),
        None => head.to_string(),
    }
}

/// First characters of the page plus its total length.
pub fn content_preview(content: &str) -> String {
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{head}... + ({} chars)", content.chars().count())
}

/// `URL: ...\nSummary: ...` blocks separated by blank lines.
pub fn format_summaries(summaries: &[SearchResult]) -> String {
    summaries
        .iter()
        .map(|s| format!("URL: {}\nSummary: {}", s.url, s.summary.as_deref().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
