//! Polite, concurrency-bounded page fetcher.
//!
//! Each fetch goes through the content cache, the robots.txt checker, a
//! global semaphore and a per-host gate that spaces requests to one host by
//! at least the configured delay. Fetched HTML is reduced to its main text.

mod fetcher;

pub use fetcher::Fetcher;

use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderValue};
use websearch_shared::{FetchConfig, Result, WebSearchError};

/// Maximum number of redirects followed for a page.
const MAX_REDIRECTS: usize = 10;

/// Build an HTTP client carrying the configured User-Agent, Accept-Encoding
/// and timeout, optionally routed through `proxy`.
pub fn build_client(config: &FetchConfig, proxy: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let encoding = HeaderValue::from_str(&config.accept_encoding).map_err(|e| {
        WebSearchError::config(format!(
            "invalid accept_encoding {:?}: {e}",
            config.accept_encoding
        ))
    })?;
    headers.insert(ACCEPT_ENCODING, encoding);

    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(config.timeout);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| WebSearchError::config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| WebSearchError::Network(format!("failed to build HTTP client: {e}")))
}
