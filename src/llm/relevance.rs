//! Decide whether a question is suited to news search before scraping anything.

use crate::api::TextCompletion;
use crate::errors::GatewayError;
use crate::llm::prompts::{relevance_prompt, RELEVANCE_TAG};
use crate::llm::tagged::extract_tagged;
use crate::utils::truncate_for_log;
use tracing::{info, instrument, warn};

/// Ask the model whether `query` fits news search or sentiment analysis.
///
/// # Errors
///
/// Only gateway failures are returned. An unparseable verdict is `Ok(false)`.
#[instrument(level = "info", skip_all, fields(query_chars = query.chars().count()))]
pub async fn is_on_topic<G: TextCompletion>(
    gateway: &G,
    query: &str,
) -> Result<bool, GatewayError> {
    let response = gateway.complete(&relevance_prompt(query)).await?;
    let verdict = parse_verdict(&response);
    info!(verdict, "Relevance verdict");
    Ok(verdict)
}

/// Read the verdict out of a relevance response.
///
/// The response is lower-cased, then the first `<is_ss>` pair is located.
/// The verdict is `true` unless `false` appears inside that span. Without a
/// tag pair the query is rejected.
pub fn parse_verdict(response: &str) -> bool {
    let lowered = response.trim().to_lowercase();
    match extract_tagged(&lowered, RELEVANCE_TAG) {
        Some(inside) => !inside.contains("false"),
        None => {
            let preview = truncate_for_log(response, 300);
            warn!(response_preview = %preview, "No verdict tag; rejecting query");
            false
        }
    }
}
