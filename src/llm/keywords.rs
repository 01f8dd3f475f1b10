//! Reduce a free-form question to a single search keyword.

use crate::api::TextCompletion;
use crate::errors::GatewayError;
use crate::llm::prompts::{keywords_prompt, KEYWORDS_TAG};
use crate::llm::tagged::extract_tagged;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

/// Ask the model for search keywords and return the first one.
///
/// An empty string means the model did not follow the tag format; the
/// caller treats it as "no keyword".
///
/// # Errors
///
/// Only gateway failures are returned. Formatting problems yield `Ok("")`.
#[instrument(level = "info", skip_all, fields(query_chars = query.chars().count()))]
pub async fn extract_keywords<G: TextCompletion>(
    gateway: &G,
    query: &str,
) -> Result<String, GatewayError> {
    let response = gateway.complete(&keywords_prompt(query)).await?;
    let keyword = first_keyword(&response);
    if keyword.is_empty() {
        let preview = truncate_for_log(&response, 300);
        warn!(response_preview = %preview, "No keyword tag in model response");
    } else {
        info!(%keyword, "Extracted search keyword");
    }
    Ok(keyword)
}

/// All keywords inside the first `<qtkeywords>` pair, split on ASCII and
/// full-width commas and trimmed. Empty segments are kept so positions match
/// what the model wrote.
pub fn parse_keywords(response: &str) -> Option<Vec<String>> {
    let payload = extract_tagged(response, KEYWORDS_TAG)?;
    Some(
        payload
            .split([',', '，'])
            .map(|k| k.trim().to_string())
            .collect_vec(),
    )
}

/// The first parsed keyword, or `""` when the tag pair is missing.
///
/// Search only takes one keyword, so the rest are logged and dropped.
pub fn first_keyword(response: &str) -> String {
    match parse_keywords(response) {
        Some(keywords) => {
            debug!(?keywords, "Parsed keywords");
            keywords.into_iter().next().unwrap_or_default()
        }
        None => String::new(),
    }
}
