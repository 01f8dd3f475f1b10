//! Data models for scraped articles, their LLM analyses, and stored history.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SearchHit`]: A title/url pair returned by the search listing
//! - [`Article`]: Canonical article record produced by the extractor
//! - [`Analysis`]: Summary, sentiment and named entities produced by the normalizer
//! - [`StoredRecord`]: One persisted Article+Analysis row with its identity
//!
//! Every text field is always populated. When extraction or parsing fails, a
//! sentinel string stands in for the missing value, so nothing here is `Option`.

use serde::{Deserialize, Serialize};

/// Sentinel used when no title could be extracted.
pub const TITLE_UNAVAILABLE: &str = "title unavailable";
/// Sentinel used when no publish date could be extracted.
pub const DATE_UNKNOWN: &str = "date unknown";
/// Sentinel used when the article body could not be located.
pub const CONTENT_UNAVAILABLE: &str = "content unavailable";

/// Sentiment labels the analysis prompt asks the model to choose from.
pub const CONVENTIONAL_SENTIMENTS: [&str; 3] = ["positive", "neutral", "negative"];

/// A single result from the publication's search listing.
///
/// Hits are transient: they drive detail fetching and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The headline as rendered in the listing.
    pub title: String,
    /// Absolute URL of the article page.
    pub url: String,
}

/// A canonical news article extracted from a fetched page.
///
/// # Fields
///
/// * `title` - Headline, or [`TITLE_UNAVAILABLE`]
/// * `publish_date` - Best-effort `YYYY-MM-DD`-like text, or [`DATE_UNKNOWN`]
/// * `content` - Body paragraphs joined with `\n`, or [`CONTENT_UNAVAILABLE`]
/// * `url` - The address the page was fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub publish_date: String,
    pub content: String,
    pub url: String,
}

/// Structured analysis of one article, as returned by the language model.
///
/// `sentiment` is free text: the model is asked for one of
/// [`CONVENTIONAL_SENTIMENTS`] but nothing forces it to comply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Short summary of the article.
    pub summary: String,
    /// Conventionally "positive", "neutral" or "negative".
    pub sentiment: String,
    /// Comma-separated entity names.
    pub ner: String,
}

impl Analysis {
    /// The record used whenever the model output cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            summary: "unable to generate summary".to_string(),
            sentiment: "unknown".to_string(),
            ner: "none".to_string(),
        }
    }

    /// Whether `sentiment` is one of the three labels the prompt asks for
    /// (compared case-insensitively, ignoring surrounding whitespace).
    pub fn has_conventional_sentiment(&self) -> bool {
        let s = self.sentiment.trim().to_lowercase();
        CONVENTIONAL_SENTIMENTS.contains(&s.as_str())
    }
}

/// A persisted Article+Analysis pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Auto-incremented row identity.
    pub id: i64,
    pub title: String,
    pub publish_date: String,
    pub content: String,
    pub url: String,
    pub summary: String,
    pub sentiment: String,
    pub ner: String,
}

/// An article paired with its analysis and the identity it was stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedArticle {
    pub id: i64,
    pub article: Article,
    pub analysis: Analysis,
}
