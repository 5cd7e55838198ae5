//! Per-origin robots.txt policy cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use texting_robots::Robot;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::origin_url;

/// Agent name evaluated against robots.txt groups.
pub const ROBOTS_AGENT: &str = "*";

/// Answers allow/deny for URLs according to their origin's robots.txt.
///
/// Parsed policies are cached per origin for the lifetime of the checker and
/// never expire. Failed lookups are not cached.
pub struct RobotsChecker {
    timeout: Duration,
    policies: Mutex<HashMap<String, Arc<Robot>>>,
}

impl RobotsChecker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `url` may be fetched.
    ///
    /// Timeouts, network errors, non-200 responses and unparsable files all
    /// count as "allowed".
    #[instrument(skip_all, fields(url = %url))]
    pub async fn is_allowed(&self, url: &str, client: &Client) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            debug!("unparsable URL, allowing");
            return true;
        };
        let Some(origin) = origin_url(&parsed) else {
            debug!("URL has no origin, allowing");
            return true;
        };

        if let Some(robot) = self.cached(&origin) {
            return evaluate(&robot, url);
        }

        match self.fetch_policy(&origin, client).await {
            Some(robot) => {
                let robot = Arc::new(robot);
                if let Ok(mut policies) = self.policies.lock() {
                    policies.insert(origin, Arc::clone(&robot));
                }
                evaluate(&robot, url)
            }
            None => true,
        }
    }

    /// Number of origins with a cached policy.
    #[cfg(test)]
    fn cached_origins(&self) -> usize {
        self.policies.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn cached(&self, origin: &str) -> Option<Arc<Robot>> {
        self.policies.lock().ok()?.get(origin).cloned()
    }

    async fn fetch_policy(&self, origin: &str, client: &Client) -> Option<Robot> {
        let robots_url = format!("{origin}/robots.txt");

        let response = match client.get(&robots_url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%robots_url, error = %e, "robots.txt fetch failed, allowing");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(%robots_url, status = %response.status(), "no robots.txt, allowing");
            return None;
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%robots_url, error = %e, "failed to read robots.txt, allowing");
                return None;
            }
        };

        match Robot::new(ROBOTS_AGENT, &body) {
            Ok(robot) => {
                debug!(%robots_url, "robots.txt cached");
                Some(robot)
            }
            Err(e) => {
                warn!(%robots_url, error = %e, "unparsable robots.txt, allowing");
                None
            }
        }
    }
}

fn evaluate(robot: &Robot, url: &str) -> bool {
    let allowed = robot.allowed(url);
    if !allowed {
        debug!(url, "disallowed by robots.txt");
    }
    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /private\n";

    fn checker() -> RobotsChecker {
        RobotsChecker::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_allow_and_deny_from_robots_txt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROBOTS_TXT))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let checker = checker();
        let base = server.uri();

        assert!(checker.is_allowed(&format!("{base}/public/page"), &client).await);
        assert!(!checker.is_allowed(&format!("{base}/private/page"), &client).await);
        assert!(!checker.is_allowed(&format!("{base}/private"), &client).await);
        assert_eq!(checker.cached_origins(), 1);
    }

    #[tokio::test]
    async fn test_missing_robots_fails_open_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let client = Client::new();
        let checker = checker();
        let url = format!("{}/anything", server.uri());

        assert!(checker.is_allowed(&url, &client).await);
        assert!(checker.is_allowed(&url, &client).await);
        assert_eq!(checker.cached_origins(), 0);
    }

    #[tokio::test]
    async fn test_server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = checker();
        let url = format!("{}/private", server.uri());
        assert!(checker.is_allowed(&url, &Client::new()).await);
        assert_eq!(checker.cached_origins(), 0);
    }

    #[tokio::test]
    async fn test_timeout_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /\n")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let checker = RobotsChecker::new(Duration::from_millis(100));
        let url = format!("{}/page", server.uri());
        assert!(checker.is_allowed(&url, &Client::new()).await);
        assert_eq!(checker.cached_origins(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_origin_fails_open() {
        // Port 9 (discard) on localhost is not served in test environments.
        let checker = RobotsChecker::new(Duration::from_millis(500));
        assert!(checker.is_allowed("http://127.0.0.1:9/page", &Client::new()).await);
        assert_eq!(checker.cached_origins(), 0);
    }

    #[tokio::test]
    async fn test_unparsable_url_is_allowed() {
        let checker = checker();
        assert!(checker.is_allowed("not a url", &Client::new()).await);
    }
}
