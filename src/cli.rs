//! Command-line interface definitions.
//!
//! Global flags override values from the YAML configuration file; every
//! subcommand accepts them.

use crate::config::Config;
use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Days of history shown when no start date is given.
pub const DEFAULT_HISTORY_DAYS: u64 = 30;

/// Search Bnext for news, analyze each article with an LLM and browse the
/// stored results.
///
/// # Examples
///
/// ```sh
/// # Ask a question; the model picks the keyword
/// bnext_news search "台積電最近的營運狀況如何?"
///
/// # Crawl a keyword directly, up to 10 articles
/// bnext_news crawl 生成式AI
///
/// # Browse the last 30 days of stored analyses mentioning a keyword
/// bnext_news history --keyword 台積電
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, env = "BNEXT_CONFIG", global = true)]
    pub config: Option<String>,

    /// SQLite database path
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Base URL of the model endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// API key for hosted model endpoints
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Show the browser window while listing search results
    #[arg(long, global = true)]
    pub headed: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a free-form question with freshly analyzed news
    Search {
        query: String,

        /// Maximum number of articles to analyze
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Also write the report as JSON under this directory
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },

    /// Fetch, analyze and store articles for a keyword, without the relevance
    /// check or synthesis
    Crawl {
        keyword: String,

        /// Maximum number of articles to analyze
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: usize,

        /// Also write the report as JSON under this directory
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },

    /// Browse stored analyses, newest first
    History {
        /// Only records whose content contains this text
        #[arg(short, long, default_value = "")]
        keyword: String,

        /// First publish date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last publish date to include (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

impl Cli {
    /// Apply global flag overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(db) = &self.db {
            config.store.path = PathBuf::from(db);
        }
        if let Some(endpoint) = &self.endpoint {
            config.gateway.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.gateway.model = model.clone();
        }
        if let Some(key) = &self.api_key {
            config.gateway.api_key = Some(key.clone());
        }
        if self.headed {
            config.listing.headless = false;
        }
        let search_limit = match &self.command {
            Command::Search { max_results, .. } => *max_results,
            _ => None,
        };
        if let Some(n) = search_limit {
            config.listing.max_results = n;
        }
    }
}

/// Resolve an optional history range to inclusive `YYYY-MM-DD` bounds.
///
/// `to` defaults to `today`; `from` defaults to [`DEFAULT_HISTORY_DAYS`]
/// before `to`.
pub fn history_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> (String, String) {
    let to = to.unwrap_or(today);
    let default_from = to.checked_sub_days(Days::new(DEFAULT_HISTORY_DAYS));
    let from = from.or(default_from).unwrap_or(NaiveDate::MIN);
    (from.to_string(), to.to_string())
}
