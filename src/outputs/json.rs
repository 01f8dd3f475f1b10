//! JSON output for search reports.
//!
//! Reports are grouped by the local date they were written on and named after
//! the search keyword:
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     └── ai.json
//! ```
//!
//! Running the same keyword twice on one day overwrites the earlier file; the
//! database keeps every analysis regardless.

use crate::orchestrator::SearchReport;
use crate::utils::slugify_title;
use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`SearchReport`] under today's date directory.
///
/// # Arguments
///
/// * `report` - The completed search to serialize
/// * `json_output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The path written: `{json_output_dir}/{YYYY-MM-DD}/{keyword-slug}.json`.
///
/// # Errors
///
/// Fails if the directory cannot be created or the file cannot be written.
pub async fn write_report(
    report: &SearchReport,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let today = Local::now().date_naive();
    write_report_on(report, json_output_dir, today).await
}

#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, %date))]
async fn write_report_on(
    report: &SearchReport,
    json_output_dir: &str,
    date: NaiveDate,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string(report)?;

    let full_json_dir = PathBuf::from(json_output_dir).join(date.to_string());
    info!(dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let file_name = format!("{}.json", file_stem(&report.keyword));
    let path = full_json_dir.join(file_name);
    fs::write(&path, json).await?;
    info!(path = %path.display(), articles = report.articles.len(), "Wrote JSON report");
    Ok(path)
}

fn file_stem(keyword: &str) -> String {
    let slug = slugify_title(keyword);
    if slug.is_empty() {
        "search".to_string()
    } else {
        slug
    }
}
