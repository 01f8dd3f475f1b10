//! Per-article analysis and the cross-article synthesis.

use crate::api::TextCompletion;
use crate::errors::GatewayError;
use crate::llm::normalize::normalize;
use crate::llm::prompts::{analysis_prompt, synthesis_prompt};
use crate::models::{Analysis, AnalyzedArticle, Article};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

/// Outcome of the synthesis step.
///
/// A failed synthesis does not fail the search: the per-article analyses are
/// already stored by the time it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Synthesis {
    /// Model text, displayed verbatim.
    Ready(String),
    /// The gateway call failed; carries the error message.
    Unavailable(String),
}

impl fmt::Display for Synthesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Synthesis::Ready(text) => f.write_str(text),
            Synthesis::Unavailable(_) => {
                f.write_str("unable to generate synthesis, please try again later")
            }
        }
    }
}

/// Ask the model to summarize and classify one article.
///
/// # Errors
///
/// Returns the gateway error if the model could not be queried. Malformed
/// answers become [`Analysis::fallback`] instead.
#[instrument(level = "info", skip_all, fields(url = %article.url))]
pub async fn analyze_article<G: TextCompletion>(
    gateway: &G,
    article: &Article,
) -> Result<Analysis, GatewayError> {
    let raw = gateway.complete(&analysis_prompt(&article.content)).await?;
    let analysis = normalize(&raw);
    info!(sentiment = %analysis.sentiment, "Analyzed article");
    Ok(analysis)
}

/// Summarize a batch of analyzed articles into one free-text overview.
///
/// The model text is returned untouched; there is no structured parse here.
#[instrument(level = "info", skip_all, fields(count = items.len()))]
pub async fn synthesize<G: TextCompletion>(gateway: &G, items: &[AnalyzedArticle]) -> Synthesis {
    match gateway.complete(&synthesis_prompt(items)).await {
        Ok(text) => Synthesis::Ready(text),
        Err(e) => {
            warn!(error = %e, "Synthesis call failed");
            Synthesis::Unavailable(e.to_string())
        }
    }
}
