//! Turn raw model text into an [`Analysis`].
//!
//! The model is told to answer with a JSON object but often wraps it in
//! prose, markdown fences, or reasoning. [`normalize`] recovers in two steps
//! and otherwise returns [`Analysis::fallback`]; it never fails.

use crate::models::Analysis;
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Greedy match from the first `{` to the last `}`.
static OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{.*\}").expect("valid object regex"));

/// Parse raw model text into an [`Analysis`].
///
/// 1. Strict JSON parse of the whole text.
/// 2. Drop newlines and carriage returns, take the first brace-delimited
///    span (greedy) and parse that strictly.
/// 3. Otherwise return [`Analysis::fallback`].
///
/// All three fields must be present as strings for a parse to count.
pub fn normalize(raw: &str) -> Analysis {
    if let Ok(analysis) = serde_json::from_str::<Analysis>(raw) {
        return analysis;
    }

    let cleaned = raw.replace('\n', " ").replace('\r', "");
    if let Some(m) = OBJECT_RE.find(cleaned.trim()) {
        match serde_json::from_str::<Analysis>(m.as_str()) {
            Ok(analysis) => {
                debug!("Recovered analysis object embedded in model output");
                return analysis;
            }
            Err(e) => {
                let candidate = truncate_for_log(m.as_str(), 300);
                warn!(error = %e, %candidate, "Embedded object did not parse");
            }
        }
    }

    let preview = truncate_for_log(raw, 300);
    warn!(response_preview = %preview, "Model output unusable; using fallback analysis");
    Analysis::fallback()
}
