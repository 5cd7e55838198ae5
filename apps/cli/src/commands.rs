//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use websearch_cache::ContentCache;
use websearch_core::{Pipeline, PipelineOutput, ProgressReporter, RunStatus};
use websearch_providers::{DuckDuckGoProvider, OpenAiClient};
use websearch_shared::{
    AppConfig, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// websearch: answer a question from the live web.
#[derive(Parser)]
#[command(
    name = "websearch",
    version,
    about = "Expand a query, search the web, and summarize the most relevant pages into one answer.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to a config file (defaults to ~/.websearch/websearch.toml).
    #[arg(long, global = true, env = "WEBSEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full search pipeline for a query.
    Search {
        /// The question to answer.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print a JSON document instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Page content cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show the number of cached pages and their total size.
    Stats,
    /// Delete every cached page.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
    /// Check the configuration and prompt templates.
    Validate,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so `--json`
/// output stays clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "websearch=info",
        1 => "websearch=debug",
        _ => "websearch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Search { query, json } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_search(&config, &query.join(" "), json).await
        }
        Command::Cache { action } => {
            let config = resolve_config(config_path.as_ref())?;
            match action {
                CacheAction::Stats => cmd_cache_stats(&config).await,
                CacheAction::Clear => cmd_cache_clear(&config).await,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_ref()).await,
            ConfigAction::Validate => cmd_config_validate(config_path.as_ref()).await,
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(config: &AppConfig, query: &str, json: bool) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        return Err(eyre!("query must not be empty"));
    }

    // Validate API key before doing anything
    let api_key = validate_api_key(config)?;

    let search = DuckDuckGoProvider::new(
        Duration::from_secs(config.search.timeout_secs),
        &config.fetch.user_agent,
    )?;
    let llm = OpenAiClient::new(&config.llm, Some(api_key))?;
    let pipeline = Pipeline::new(config, Arc::new(search), Arc::new(llm))?;

    info!(query, model = %config.llm.model, "running search");

    let reporter = CliProgress::new(!json);
    let output = pipeline.run_with_progress(query, &reporter).await;

    if json {
        print_json(&output)?;
    } else {
        print_text(&output);
    }

    Ok(())
}

fn print_json(output: &PipelineOutput) -> Result<()> {
    let doc = serde_json::json!({
        "final_answer": output.answer,
        "status": output.status,
        "results": output.results,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn print_text(output: &PipelineOutput) {
    if !output.results.is_empty() {
        println!();
        println!("  Sources:");
        for (i, result) in output.results.iter().enumerate() {
            println!("  {:>2}. [{}/5] {}", i + 1, result.relevance, result.title);
            println!("      {}", result.url);
        }
    }

    println!();
    if output.status == RunStatus::AnswerDegraded {
        println!("  Answer unavailable: {}", output.answer);
    } else {
        println!("{}", output.answer);
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(format!("{name}..."));
    }

    fn stage_done(&self, name: &str, count: usize) {
        self.spinner.set_message(format!("{name}: {count}"));
    }

    fn done(&self, _output: &PipelineOutput) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_cache_stats(config: &AppConfig) -> Result<()> {
    let Some(dir) = config.cache_dir() else {
        println!("Cache is disabled.");
        return Ok(());
    };

    let cache = ContentCache::open(dir)?;
    let stats = cache.stats().await?;
    println!("  Directory: {}", cache.dir().display());
    println!("  Entries:   {}", stats.entries);
    println!("  Size:      {:.1} KiB", stats.total_bytes as f64 / 1024.0);
    Ok(())
}

async fn cmd_cache_clear(config: &AppConfig) -> Result<()> {
    let Some(dir) = config.cache_dir() else {
        println!("Cache is disabled.");
        return Ok(());
    };

    let cache = ContentCache::open(dir)?;
    let removed = cache.clear().await?;
    println!("Removed {removed} cached pages from {}", cache.dir().display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn cmd_config_validate(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    config.validate()?;

    let prompts = websearch_core::PromptTemplates::from_config(&config.prompts)?;
    prompts.validate()?;

    let source = match path {
        Some(p) => p.clone(),
        None => config_file_path()?,
    };
    println!("Config OK: {}", source.display());

    match validate_api_key(&config) {
        Ok(_) => println!("API key found in ${}", config.llm.api_key_env),
        Err(_) => println!("Warning: ${} is not set", config.llm.api_key_env),
    }
    Ok(())
}
