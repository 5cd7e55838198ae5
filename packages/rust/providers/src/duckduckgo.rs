//! DuckDuckGo search provider
//!
//! Queries DuckDuckGo's HTML interface. No API key required.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;
use websearch_shared::{Result, SearchHit, WebSearchError};

use crate::search::SearchProvider;

/// DuckDuckGo HTML endpoint.
pub const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

static RESULT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.result").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a").expect("valid selector"));
static SNIPPET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result__snippet").expect("valid selector"));

/// DuckDuckGo search provider (no API key required)
pub struct DuckDuckGoProvider {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoProvider {
    /// Create a provider with the given request timeout and User-Agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| WebSearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: DDG_HTML_URL.to_string(),
        })
    }

    /// Send queries to a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    #[instrument(skip_all, fields(provider = "duckduckgo", query = %query))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebSearchError::Network(format!("search timed out: {e}"))
                } else {
                    WebSearchError::Network(format!("search request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebSearchError::Provider(format!(
                "DuckDuckGo returned HTTP {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| WebSearchError::Network(format!("failed to read search body: {e}")))?;

        let hits = parse_results(&html, max_results);
        debug!(count = hits.len(), "search returned hits");
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

/// Parse a DuckDuckGo HTML results page. Ads are skipped.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);

    doc.select(&RESULT_SEL)
        .filter(|block| !is_ad(block))
        .filter_map(|block| {
            let link = block.select(&TITLE_SEL).next()?;
            let url = resolve_result_url(link.value().attr("href")?)?;
            let title = collapse_text(&link);
            let snippet = block
                .select(&SNIPPET_SEL)
                .next()
                .map(|s| collapse_text(&s))
                .unwrap_or_default();
            Some(SearchHit {
                title,
                url,
                snippet,
            })
        })
        .take(max_results)
        .collect()
}

fn is_ad(block: &ElementRef) -> bool {
    block
        .value()
        .classes()
        .any(|c| c == "result--ad" || c == "result--ad--small")
}

/// Unwrap DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=<encoded>&rut=...`).
fn resolve_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }

    match parsed.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

fn collapse_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS_HTML: &str = r##"<html><body><div id="links">
        <div class="result results_links result--ad">
          <a class="result__a" href="https://ads.example/buy">Sponsored</a>
          <a class="result__snippet">Buy now</a>
        </div>
        <div class="result results_links web-result">
          <h2 class="result__title">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fclimate.example%2Fpolicy%3Fyear%3D2025&amp;rut=abc">
              Climate <b>policy</b> 2025
            </a>
          </h2>
          <a class="result__snippet" href="#">An overview of &amp; new <b>climate</b> rules.</a>
        </div>
        <div class="result results_links web-result">
          <a class="result__a" href="https://eu.example/green-deal">EU Green Deal</a>
        </div>
        <div class="result results_links web-result">
          <a class="result__a" href="https://third.example/">Third</a>
          <a class="result__snippet">Third snippet</a>
        </div>
    </div></body></html>"##;

    #[test]
    fn test_parse_results() {
        let hits = parse_results(RESULTS_HTML, 10);
        assert_eq!(hits.len(), 3);

        assert_eq!(hits[0].url, "https://climate.example/policy?year=2025");
        assert_eq!(hits[0].title, "Climate policy 2025");
        assert_eq!(hits[0].snippet, "An overview of & new climate rules.");

        assert_eq!(hits[1].url, "https://eu.example/green-deal");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_results_respects_limit() {
        let hits = parse_results(RESULTS_HTML, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "EU Green Deal");
    }

    #[test]
    fn test_parse_empty_html() {
        assert!(parse_results("", 10).is_empty());
    }

    #[test]
    fn test_resolve_result_url() {
        assert_eq!(
            resolve_result_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=abc").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            resolve_result_url("https://example.com/a").as_deref(),
            Some("https://example.com/a")
        );
        assert!(resolve_result_url("javascript:void(0)").is_none());
    }

    #[tokio::test]
    async fn test_search_against_mock_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("q=climate+policy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_HTML))
            .expect(1)
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(Duration::from_secs(5), "test-agent")
            .unwrap()
            .with_endpoint(format!("{}/html/", server.uri()));

        let hits = provider.search("climate policy", 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(provider.name(), "duckduckgo");
    }

    #[tokio::test]
    async fn test_search_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(Duration::from_secs(5), "test-agent")
            .unwrap()
            .with_endpoint(server.uri());

        let err = provider.search("anything", 5).await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
