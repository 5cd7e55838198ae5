//! Application configuration for the web search pipeline.
//!
//! User config lives at `~/.websearch/websearch.toml`.
//! Values missing from the file fall back to defaults; the CLI `--config` flag
//! selects a different file.
//! The API key itself is never stored; the config names the env var holding it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebSearchError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "websearch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".websearch";

/// Browser-like User-Agent string.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Highest relevance score the rating prompt asks for.
pub const MAX_RELEVANCE: i32 = 5;

// ---------------------------------------------------------------------------
// Config structs (matching websearch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Content fetching and politeness settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Result filtering.
    #[serde(default)]
    pub filter: FilterConfig,

    /// On-disk content cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Proxy rotation.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Prompt template overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 to 2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Per-call output token budgets.
    #[serde(default)]
    pub tokens: TokenBudgets,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            tokens: TokenBudgets::default(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1-nano".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[llm.tokens]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgets {
    #[serde(default = "default_tokens_expand")]
    pub expand_queries: u32,
    #[serde(default = "default_tokens_relevance")]
    pub relevance: u32,
    #[serde(default = "default_tokens_summarize")]
    pub summarize: u32,
    #[serde(default = "default_tokens_merge")]
    pub merge: u32,
    /// Reserved for a coverage check stage; not consumed by the pipeline.
    #[serde(default = "default_tokens_coverage")]
    pub coverage: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            expand_queries: default_tokens_expand(),
            relevance: default_tokens_relevance(),
            summarize: default_tokens_summarize(),
            merge: default_tokens_merge(),
            coverage: default_tokens_coverage(),
        }
    }
}

fn default_tokens_expand() -> u32 {
    512
}
fn default_tokens_relevance() -> u32 {
    100
}
fn default_tokens_summarize() -> u32 {
    2048
}
fn default_tokens_merge() -> u32 {
    4096
}
fn default_tokens_coverage() -> u32 {
    1024
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results requested from the provider for each expanded query.
    #[serde(default = "default_results_per_query")]
    pub max_results_per_query: usize,

    /// Maximum number of expanded queries kept.
    #[serde(default = "default_num_queries")]
    pub num_queries: usize,

    /// Search request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: default_results_per_query(),
            num_queries: default_num_queries(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_results_per_query() -> usize {
    5
}
fn default_num_queries() -> usize {
    10
}
fn default_search_timeout() -> u64 {
    10
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Maximum simultaneously in-flight page fetches.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_per_domain_delay")]
    pub per_domain_delay_ms: u64,

    /// Page fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// robots.txt fetch timeout in seconds.
    #[serde(default = "default_robots_timeout")]
    pub robots_timeout_secs: u64,

    /// User-Agent header for page and robots.txt requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Encoding header for page requests.
    #[serde(default = "default_accept_encoding")]
    pub accept_encoding: String,

    /// Character budget for content handed to the summarization prompt.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            per_domain_delay_ms: default_per_domain_delay(),
            timeout_secs: default_fetch_timeout(),
            robots_timeout_secs: default_robots_timeout(),
            user_agent: default_user_agent(),
            accept_encoding: default_accept_encoding(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_max_concurrent() -> usize {
    20
}
fn default_per_domain_delay() -> u64 {
    800
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_robots_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_accept_encoding() -> String {
    "gzip, deflate, br".into()
}
fn default_max_content_chars() -> usize {
    8000
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum relevance score (0 to 5) a result needs to be fetched.
    #[serde(default = "default_min_relevance")]
    pub min_relevance: i32,

    /// Hosts containing any of these strings are never collected.
    #[serde(default = "default_disallowed_domains")]
    pub disallowed_domains: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_relevance: default_min_relevance(),
            disallowed_domains: default_disallowed_domains(),
        }
    }
}

fn default_min_relevance() -> i32 {
    3
}
fn default_disallowed_domains() -> Vec<String> {
    vec!["youtube.com".into(), "youtu.be".into()]
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether extracted page text is cached on disk.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory (`~` is expanded).
    #[serde(default = "default_cache_dir")]
    pub directory: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_dir() -> String {
    "~/.websearch/cache".into()
}

/// `[proxy]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether fetches rotate through `proxies`.
    #[serde(default)]
    pub enabled: bool,

    /// Proxy URLs, assigned round-robin by result index.
    #[serde(default)]
    pub proxies: Vec<String>,
}

/// `[prompts]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// TOML file overriding the built-in prompt templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            problems.push(format!(
                "llm.temperature must be between 0 and 2 (got {})",
                self.llm.temperature
            ));
        }
        if self.llm.model.trim().is_empty() {
            problems.push("llm.model must not be empty".into());
        }
        if url::Url::parse(&self.llm.base_url).is_err() {
            problems.push(format!("llm.base_url is not a valid URL: {}", self.llm.base_url));
        }

        let tokens = &self.llm.tokens;
        for (name, value) in [
            ("expand_queries", tokens.expand_queries),
            ("relevance", tokens.relevance),
            ("summarize", tokens.summarize),
            ("merge", tokens.merge),
            ("coverage", tokens.coverage),
        ] {
            if value == 0 {
                problems.push(format!("llm.tokens.{name} must be greater than 0"));
            }
        }

        for (name, value) in [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("search.timeout_secs", self.search.timeout_secs),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
            ("fetch.robots_timeout_secs", self.fetch.robots_timeout_secs),
            ("fetch.per_domain_delay_ms", self.fetch.per_domain_delay_ms),
        ] {
            if value == 0 {
                problems.push(format!("{name} must be greater than 0"));
            }
        }

        for (name, value) in [
            ("search.max_results_per_query", self.search.max_results_per_query),
            ("search.num_queries", self.search.num_queries),
            ("fetch.max_concurrent", self.fetch.max_concurrent),
            ("fetch.max_content_chars", self.fetch.max_content_chars),
        ] {
            if value == 0 {
                problems.push(format!("{name} must be greater than 0"));
            }
        }

        if !(0..=MAX_RELEVANCE).contains(&self.filter.min_relevance) {
            problems.push(format!(
                "filter.min_relevance must be between 0 and {MAX_RELEVANCE} (got {})",
                self.filter.min_relevance
            ));
        }

        if self.proxy.enabled && self.proxy.proxies.is_empty() {
            problems.push("proxy.enabled is set but proxy.proxies is empty".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(WebSearchError::config(problems.join("; ")))
        }
    }

    /// Proxies to rotate through, or an empty list when rotation is off.
    pub fn active_proxies(&self) -> Vec<String> {
        if self.proxy.enabled {
            self.proxy.proxies.clone()
        } else {
            Vec::new()
        }
    }

    /// Cache directory with `~` expanded, or `None` when caching is disabled.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.enabled.then(|| expand_home(&self.cache.directory))
    }
}

// ---------------------------------------------------------------------------
// Fetch config (runtime view consumed by the fetcher and robots checker)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Size of the global fetch semaphore.
    pub max_concurrent: usize,
    /// Minimum delay between two requests to one host.
    pub per_domain_delay: Duration,
    /// Page fetch timeout.
    pub timeout: Duration,
    /// robots.txt fetch timeout.
    pub robots_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Accept-Encoding header for the first attempt.
    pub accept_encoding: String,
    /// Proxy URLs the fetcher prepares clients for.
    pub proxies: Vec<String>,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.fetch.max_concurrent,
            per_domain_delay: Duration::from_millis(config.fetch.per_domain_delay_ms),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            robots_timeout: Duration::from_secs(config.fetch.robots_timeout_secs),
            user_agent: config.fetch.user_agent.clone(),
            accept_encoding: config.fetch.accept_encoding.clone(),
            proxies: config.active_proxies(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime view consumed by the orchestrator)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub num_queries: usize,
    pub max_results_per_query: usize,
    pub min_relevance: i32,
    pub max_content_chars: usize,
    pub tokens: TokenBudgets,
    pub proxies: Vec<String>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            num_queries: config.search.num_queries,
            max_results_per_query: config.search.max_results_per_query,
            min_relevance: config.filter.min_relevance,
            max_content_chars: config.fetch.max_content_chars,
            tokens: config.llm.tokens.clone(),
            proxies: config.active_proxies(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.websearch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WebSearchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.websearch/websearch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WebSearchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| WebSearchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WebSearchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WebSearchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WebSearchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named in the config.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(WebSearchError::config(format!(
            "API key not found. Set the {var_name} environment variable.\n\
             Example: export {var_name}='your-api-key-here'"
        ))),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("youtube.com"));
        assert!(toml_str.contains("max_results_per_query"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.search.num_queries, 10);
        assert_eq!(parsed.llm.tokens.merge, 4096);
        assert_eq!(parsed.filter.min_relevance, 3);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[llm]
model = "gpt-4o-mini"

[filter]
disallowed_domains = ["pinterest.com"]

[proxy]
enabled = true
proxies = ["http://proxy-a:8080", "http://proxy-b:8080"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.filter.disallowed_domains, vec!["pinterest.com"]);
        assert_eq!(config.filter.min_relevance, 3);
        assert_eq!(config.active_proxies().len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.llm.temperature = 3.5;
        config.filter.min_relevance = 9;
        config.fetch.max_concurrent = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("temperature"));
        assert!(err.contains("min_relevance"));
        assert!(err.contains("fetch.max_concurrent"));
    }

    #[test]
    fn validation_rejects_enabled_proxies_without_list() {
        let mut config = AppConfig::default();
        config.proxy.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn proxies_inactive_unless_enabled() {
        let mut config = AppConfig::default();
        config.proxy.proxies = vec!["http://proxy:3128".into()];
        assert!(config.active_proxies().is_empty());
        assert!(FetchConfig::from(&config).proxies.is_empty());
    }

    #[test]
    fn fetch_config_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.max_concurrent, 20);
        assert_eq!(fetch.per_domain_delay, Duration::from_millis(800));
        assert_eq!(fetch.timeout, Duration::from_secs(30));
        assert_eq!(fetch.robots_timeout, Duration::from_secs(10));
        assert_eq!(fetch.accept_encoding, "gzip, deflate, br");
    }

    #[test]
    fn cache_dir_disabled_is_none() {
        let mut config = AppConfig::default();
        config.cache.directory = "/tmp/websearch-cache".into();
        assert_eq!(config.cache_dir(), Some(PathBuf::from("/tmp/websearch-cache")));

        config.cache.enabled = false;
        assert!(config.cache_dir().is_none());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("relative/cache"), PathBuf::from("relative/cache"));
        assert_eq!(expand_home("/abs/cache"), PathBuf::from("/abs/cache"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/cache"), home.join("cache"));
        }
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("websearch.toml");
        std::fs::write(&path, "[search]\nnum_queries = 4\n").expect("write");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.search.num_queries, 4);
        assert_eq!(config.search.max_results_per_query, 5);
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[search\nnum_queries = ").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "WS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
