//! Prompting and response parsing on top of the text-completion gateway.
//!
//! Each submodule pairs a prompt with a parser that tolerates a model which
//! does not reliably honor the requested output format:
//!
//! | Module | Asks for | Falls back to |
//! |--------|----------|---------------|
//! | [`relevance`] | `<is_ss> ... True/False <is_ss>` | not relevant |
//! | [`keywords`] | `<qtkeywords> k1, k2 <qtkeywords>` | empty keyword |
//! | [`synthesis`] | JSON `{summary, sentiment, ner}` per article, free text for the batch | [`crate::models::Analysis::fallback`] |
//!
//! Gateway failures are always returned as errors; only formatting problems
//! are absorbed.

pub mod keywords;
pub mod normalize;
pub mod prompts;
pub mod relevance;
pub mod synthesis;
pub mod tagged;
