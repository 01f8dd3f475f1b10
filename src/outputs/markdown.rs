//! Markdown rendering for the terminal.
//!
//! Reports show each analyzed article with a short content preview followed by
//! the synthesis; history listings show stored records newest first.

use crate::models::StoredRecord;
use crate::orchestrator::SearchReport;
use crate::utils::preview;
use std::fmt::Write;

/// Characters of article content shown per report entry.
pub const REPORT_PREVIEW_CHARS: usize = 200;
/// Characters of article content shown per history entry.
pub const HISTORY_PREVIEW_CHARS: usize = 300;

/// Render a completed search or crawl.
pub fn report_to_markdown(report: &SearchReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# News for \"{}\"\n", report.keyword);
    if report.query != report.keyword {
        let _ = writeln!(md, "_Query: {}_\n", report.query);
    }
    let count = report.articles.len();
    let _ = writeln!(md, "{count} article(s) analyzed and stored.\n");

    for (i, item) in report.articles.iter().enumerate() {
        let article = &item.article;
        let analysis = &item.analysis;
        let _ = writeln!(md, "## {}. {}\n", i + 1, article.title);
        let _ = writeln!(md, "- **Date:** {}", article.publish_date);
        let _ = writeln!(md, "- **URL:** <{}>", article.url);
        let _ = writeln!(md, "- **Sentiment:** {}", analysis.sentiment);
        let _ = writeln!(md, "- **Entities:** {}\n", analysis.ner);
        let _ = writeln!(md, "**Summary:** {}\n", analysis.summary);
        let excerpt = preview(&article.content, REPORT_PREVIEW_CHARS);
        let _ = writeln!(md, "> {}\n", quote(&excerpt));
    }

    if let Some(synthesis) = &report.synthesis {
        let _ = writeln!(md, "## Overall synthesis\n");
        let _ = writeln!(md, "{synthesis}");
    }
    md
}

/// Render a history query result.
///
/// An empty `keyword` is shown as "all articles".
pub fn history_to_markdown(
    records: &[StoredRecord],
    keyword: &str,
    date_from: &str,
    date_to: &str,
) -> String {
    let mut md = String::new();
    let subject = if keyword.is_empty() {
        "all articles".to_string()
    } else {
        format!("\"{keyword}\"")
    };
    let _ = writeln!(md, "# History: {subject}, {date_from} to {date_to}\n");

    if records.is_empty() {
        let _ = writeln!(md, "No stored articles match.");
        return md;
    }

    for record in records {
        let _ = writeln!(md, "## {} ({})\n", record.title, record.publish_date);
        let _ = writeln!(md, "- **ID:** {}", record.id);
        let _ = writeln!(md, "- **URL:** <{}>", record.url);
        let _ = writeln!(md, "- **Sentiment:** {}", record.sentiment);
        let _ = writeln!(md, "- **Entities:** {}\n", record.ner);
        let _ = writeln!(md, "**Summary:** {}\n", record.summary);
        let excerpt = preview(&record.content, HISTORY_PREVIEW_CHARS);
        let _ = writeln!(md, "> {}\n", quote(&excerpt));
    }
    md
}

/// Keep multi-paragraph text inside one blockquote.
fn quote(text: &str) -> String {
    text.replace('\n', "\n> ")
}
