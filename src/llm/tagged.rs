//! Parser for tag-delimited model answers.
//!
//! The prompts ask the model to wrap its answer between two copies of the
//! *same* marker, e.g. `<qtkeywords> AI, 晶片 <qtkeywords>`. There is no
//! closing `</qtkeywords>`, so an XML/HTML parser would treat the second
//! marker as a nested element. This parser instead looks for the first and
//! second occurrence of the literal marker and returns what lies between.

/// The literal marker for `tag`, e.g. `is_ss` -> `<is_ss>`.
pub fn marker(tag: &str) -> String {
    format!("<{tag}>")
}

/// Return the trimmed text between the first two occurrences of `<tag>` in `text`.
///
/// Matching is exact and case-sensitive. Returns `None` when fewer than two
/// markers are present.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(extract_tagged("x <k> a, b <k> y", "k"), Some("a, b"));
/// assert_eq!(extract_tagged("<k> only one", "k"), None);
/// ```
pub fn extract_tagged<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let marker = marker(tag);
    let start = text.find(&marker)? + marker.len();
    let end = start + text[start..].find(&marker)?;
    Some(text[start..end].trim())
}
