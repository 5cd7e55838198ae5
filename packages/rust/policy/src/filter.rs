//! Disallowed-domain filter for search results.

use tracing::debug;
use url::Url;

/// Rejects URLs whose host contains any configured disallowed domain.
///
/// Matching is a case-insensitive substring test against the host, so
/// `youtube.com` also rejects `m.youtube.com` and `www.youtube.com.evil.test`.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    disallowed: Vec<String>,
}

impl UrlFilter {
    /// Build a filter from configured domain strings. Blank entries are ignored.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let disallowed = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { disallowed }
    }

    /// Whether the URL may be collected.
    ///
    /// Unparsable URLs and URLs without a host are rejected.
    pub fn is_allowed(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                debug!(url, error = %e, "rejecting unparsable URL");
                return false;
            }
        };

        let Some(host) = parsed.host_str() else {
            debug!(url, "rejecting URL without host");
            return false;
        };
        let host = host.to_lowercase();

        match self.disallowed.iter().find(|d| host.contains(d.as_str())) {
            Some(domain) => {
                debug!(url, %domain, "URL on disallowed domain");
                false
            }
            None => true,
        }
    }

    /// The normalized disallowed domains.
    pub fn domains(&self) -> &[String] {
        &self.disallowed
    }
}
