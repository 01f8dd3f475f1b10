//! # Bnext News
//!
//! Searches Bnext (數位時代) for articles on a topic, asks a language model to
//! summarize each one, classify its sentiment and list its named entities,
//! stores every analysis in SQLite, and lets you browse that history.
//!
//! ## Usage
//!
//! ```sh
//! bnext_news search "生成式AI 對半導體產業的影響?"
//! bnext_news crawl 台積電 -n 5
//! bnext_news history --keyword 台積電 --from 2025-05-01
//! ```
//!
//! ## Architecture
//!
//! A `search` request runs strictly in sequence:
//! 1. **Relevance**: the model judges whether the question suits news search
//! 2. **Keyword**: the model reduces the question to one search keyword
//! 3. **Listing**: headless Chrome renders the site search and collects hits
//! 4. **Fetching**: each article page is downloaded and parsed
//! 5. **Analysis**: each article is summarized and stored immediately
//! 6. **Synthesis**: the model writes one overview of the whole batch

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod config;
mod errors;
mod llm;
mod models;
mod orchestrator;
mod outputs;
mod scrapers;
mod store;
mod utils;

use api::LlmGateway;
use cli::{history_range, Cli, Command};
use config::Config;
use orchestrator::{Orchestrator, SearchOutcome, Stage};
use outputs::{json, markdown};
use scrapers::bnext::HttpFetcher;
use scrapers::browser::BrowserLister;
use store::{ResultStore, SqliteStore};
use utils::ensure_writable_dir;

type App = Orchestrator<LlmGateway, BrowserLister, HttpFetcher, SqliteStore>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("bnext_news starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref().map(Path::new))?;
    args.apply_overrides(&mut config);
    info!(
        provider = ?config.gateway.provider,
        model = %config.gateway.model,
        db = %config.store.path.display(),
        "Configuration ready"
    );

    let store = SqliteStore::open(&config.store.path).await?;

    match &args.command {
        Command::Search {
            query,
            json_output_dir,
            ..
        } => {
            check_output_dir(json_output_dir.as_deref()).await?;
            let app = build_app(&config, store)?;
            let outcome = run_interruptible(app.run(query, print_stage)).await?;
            present(outcome, json_output_dir.as_deref()).await?;
        }
        Command::Crawl {
            keyword,
            max_results,
            json_output_dir,
        } => {
            check_output_dir(json_output_dir.as_deref()).await?;
            let app = build_app(&config, store)?;
            let request = app.run_keyword(keyword, *max_results, print_stage);
            let outcome = run_interruptible(request).await?;
            present(outcome, json_output_dir.as_deref()).await?;
        }
        Command::History { keyword, from, to } => {
            let (date_from, date_to) = history_range(*from, *to, Local::now().date_naive());
            let records = store.query(keyword, &date_from, &date_to).await?;
            info!(count = records.len(), %date_from, %date_to, "Loaded history");
            let md = markdown::history_to_markdown(&records, keyword, &date_from, &date_to);
            print!("{md}");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn build_app(config: &Config, store: SqliteStore) -> Result<App, Box<dyn Error>> {
    let gateway = LlmGateway::new(config.gateway.clone())?;
    let lister = BrowserLister::new(config.listing.clone());
    let fetcher = HttpFetcher::new(&config.fetch)?;
    Ok(Orchestrator::new(
        gateway,
        lister,
        fetcher,
        store,
        config.listing.max_results,
        Duration::from_secs(config.pipeline.article_timeout_secs),
    ))
}

/// Fail before any scraping if the JSON directory is unusable.
async fn check_output_dir(dir: Option<&str>) -> Result<(), Box<dyn Error>> {
    let Some(dir) = dir else {
        return Ok(());
    };
    if let Err(e) = ensure_writable_dir(dir).await {
        error!(
            path = %dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    Ok(())
}

/// Await a request, abandoning it on Ctrl-C. Records stored before the
/// interrupt stay in the database.
async fn run_interruptible<T, E>(
    request: impl Future<Output = Result<T, E>>,
) -> Result<T, Box<dyn Error>>
where
    E: Error + 'static,
{
    tokio::select! {
        res = request => res.map_err(|e| {
            error!(error = %e, "Request failed");
            eprintln!("Request failed: {e}");
            Box::new(e) as Box<dyn Error>
        }),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; abandoning the current request");
            Err("interrupted".into())
        }
    }
}

fn print_stage(stage: Stage) {
    if !matches!(stage, Stage::Idle | Stage::Done) {
        eprintln!("==> {stage}");
    }
}

async fn present(
    outcome: SearchOutcome,
    json_output_dir: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    match outcome {
        SearchOutcome::Rejected => {
            println!("This question is not a news topic; nothing was searched.");
        }
        SearchOutcome::NoKeyword => {
            println!("Could not derive a search keyword; please rephrase.");
        }
        SearchOutcome::NoResults { keyword } => {
            println!("No articles found for \"{keyword}\".");
        }
        SearchOutcome::Completed(report) => {
            print!("{}", markdown::report_to_markdown(&report));
            if let Some(dir) = json_output_dir {
                let path = json::write_report(&report, dir).await?;
                println!("\nReport written to {}", path.display());
            }
        }
    }
    Ok(())
}
