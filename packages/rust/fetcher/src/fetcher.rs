use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use websearch_cache::ContentCache;
use websearch_policy::RobotsChecker;
use websearch_shared::{FetchConfig, Result};

use crate::build_client;

/// Accept-Encoding sent when a response could not be decoded.
const RETRY_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Content encodings the HTTP client can decode.
const SUPPORTED_ENCODINGS: &[&str] = &["gzip", "x-gzip", "deflate", "br", "identity"];

type DomainGate = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Rate-limited page fetcher.
///
/// Holds the per-host rate state for its whole lifetime, so reusing one
/// `Fetcher` across runs keeps spacing requests correctly.
pub struct Fetcher {
    config: FetchConfig,
    semaphore: Semaphore,
    /// Host key -> gate holding the time of the last request to that host.
    domains: Mutex<HashMap<String, DomainGate>>,
    proxy_clients: HashMap<String, Client>,
}

/// Why a page body could not be turned into text.
enum BodyError {
    /// The body used an encoding the client could not decode.
    Encoding(String),
    Other(String),
}

impl Fetcher {
    /// Create a fetcher, preparing one client per configured proxy.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut proxy_clients = HashMap::new();
        for proxy in &config.proxies {
            proxy_clients.insert(proxy.clone(), build_client(&config, Some(proxy))?);
        }

        Ok(Self {
            semaphore: Semaphore::new(config.max_concurrent.max(1)),
            config,
            domains: Mutex::new(HashMap::new()),
            proxy_clients,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `url` and return its extracted main text.
    ///
    /// A cache hit is returned immediately, skipping robots.txt and rate
    /// limiting. Every failure (robots denial, timeout, non-200, PDF, empty
    /// extraction) yields `None`.
    #[instrument(skip_all, fields(url = %url, proxy = proxy.unwrap_or("-")))]
    pub async fn fetch_with_cache(
        &self,
        url: &str,
        client: &Client,
        cache: Option<&ContentCache>,
        robots: &RobotsChecker,
        proxy: Option<&str>,
    ) -> Option<String> {
        if let Some(cache) = cache {
            if let Some(cached) = cache.read(url).await.filter(|c| !c.is_empty()) {
                return Some(cached);
            }
        }

        if !robots.is_allowed(url, client).await {
            info!("blocked by robots.txt");
            return None;
        }

        let text = {
            let Ok(_permit) = self.semaphore.acquire().await else {
                warn!("fetch semaphore closed");
                return None;
            };
            let proxied;
            let client = match proxy {
                Some(p) => match self.proxy_client(p) {
                    Some(c) => {
                        proxied = c;
                        &proxied
                    }
                    None => return None,
                },
                None => client,
            };
            self.fetch_url(url, client).await
        };

        if let (Some(cache), Some(text)) = (cache, text.as_deref()) {
            cache.write(url, text).await;
        }

        text
    }

    /// Time of the last request issued to `host` (as `host` or `host:port`).
    #[cfg(test)]
    async fn last_fetch(&self, host: &str) -> Option<Instant> {
        let gate = self.domains.lock().ok()?.get(host).cloned()?;
        let last = *gate.lock().await;
        last
    }

    fn proxy_client(&self, proxy: &str) -> Option<Client> {
        if let Some(client) = self.proxy_clients.get(proxy) {
            return Some(client.clone());
        }
        match build_client(&self.config, Some(proxy)) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(proxy, error = %e, "unusable proxy");
                None
            }
        }
    }

    fn gate_for(&self, host: &str) -> Option<DomainGate> {
        let mut domains = self.domains.lock().ok()?;
        Some(Arc::clone(domains.entry(host.to_string()).or_default()))
    }

    /// Fetch under the host gate, enforcing the per-host delay.
    async fn fetch_url(&self, url: &str, client: &Client) -> Option<String> {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "unparsable URL");
                return None;
            }
        };
        let Some(host) = host_key(&parsed) else {
            warn!("URL has no host");
            return None;
        };
        let gate = self.gate_for(&host)?;

        let mut last_fetch = gate.lock().await;
        if let Some(last) = *last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.config.per_domain_delay {
                let wait = self.config.per_domain_delay - elapsed;
                debug!(%host, wait_ms = wait.as_millis(), "waiting for per-domain delay");
                tokio::time::sleep(wait).await;
            }
        }

        let sent = client.get(url).send().await;
        *last_fetch = Some(Instant::now());

        let response = match sent {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!("timeout fetching page");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "request failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "non-200 status");
            return None;
        }

        if is_pdf(url, response.headers()) {
            info!("skipping PDF");
            return None;
        }

        let html = match read_body(response).await {
            Ok(html) => html,
            Err(BodyError::Encoding(reason)) => {
                warn!(%reason, "content encoding error, retrying with restricted Accept-Encoding");
                self.retry_restricted(url, client, &mut last_fetch).await?
            }
            Err(BodyError::Other(reason)) => {
                warn!(%reason, "failed to read body");
                return None;
            }
        };
        drop(last_fetch);

        match websearch_extract::extract_main_text(&html) {
            Some(text) => {
                info!(chars = text.chars().count(), "fetched page");
                Some(text)
            }
            None => {
                warn!("no text extracted");
                None
            }
        }
    }

    async fn retry_restricted(
        &self,
        url: &str,
        client: &Client,
        last_fetch: &mut Option<Instant>,
    ) -> Option<String> {
        let sent = client
            .get(url)
            .header(ACCEPT_ENCODING, RETRY_ACCEPT_ENCODING)
            .send()
            .await;
        *last_fetch = Some(Instant::now());

        let response = match sent {
            Ok(r) if r.status() == StatusCode::OK => r,
            Ok(r) => {
                warn!(status = %r.status(), "retry returned non-200");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "retry failed");
                return None;
            }
        };

        match read_body(response).await {
            Ok(html) => Some(html),
            Err(BodyError::Encoding(reason) | BodyError::Other(reason)) => {
                warn!(%reason, "retry body unreadable");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Rate-limit key: host, plus port when one is given explicitly.
fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host),
    }
}

fn is_pdf(url: &str, headers: &HeaderMap) -> bool {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    content_type.contains("application/pdf") || url.to_lowercase().ends_with(".pdf")
}

async fn read_body(response: Response) -> std::result::Result<String, BodyError> {
    if let Some(encoding) = unsupported_encoding(response.headers()) {
        return Err(BodyError::Encoding(format!("unsupported content-encoding {encoding}")));
    }
    response.text().await.map_err(|e| {
        if e.is_decode() {
            BodyError::Encoding(e.to_string())
        } else {
            BodyError::Other(e.to_string())
        }
    })
}

fn unsupported_encoding(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_ENCODING)?.to_str().ok()?;
    value
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .find(|e| !e.is_empty() && !SUPPORTED_ENCODINGS.contains(&e.as_str()))
}
