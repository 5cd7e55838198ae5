//! Crawl politeness and scope policy.
//!
//! Two independent predicates gate which URLs the pipeline may touch:
//! - [`UrlFilter`] drops results whose host matches a disallowed domain.
//!   It never touches the network and fails closed on unparsable URLs.
//! - [`RobotsChecker`] consults each origin's `robots.txt`, caching the parsed
//!   policy per origin. It fails open when `robots.txt` cannot be retrieved.

mod filter;
mod robots;

pub use filter::UrlFilter;
pub use robots::{ROBOTS_AGENT, RobotsChecker};

use url::Url;

/// Extract the origin (scheme + host + port) from a URL.
pub fn origin_url(url: &Url) -> Option<String> {
    let scheme = url.scheme();
    let host = url.host_str()?;

    match url.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_url_simple() {
        let url = Url::parse("https://docs.example.com/foo/bar").unwrap();
        assert_eq!(origin_url(&url).unwrap(), "https://docs.example.com");
    }

    #[test]
    fn test_origin_url_with_port() {
        let url = Url::parse("http://localhost:3000/docs").unwrap();
        assert_eq!(origin_url(&url).unwrap(), "http://localhost:3000");
    }

    #[test]
    fn test_origin_url_without_host() {
        let url = Url::parse("mailto:someone@example.com").unwrap();
        assert!(origin_url(&url).is_none());
    }
}
