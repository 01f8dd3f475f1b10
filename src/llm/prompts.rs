//! Prompt templates sent to the text-completion gateway.

use crate::models::AnalyzedArticle;
use itertools::Itertools;

/// Marker wrapping the keyword answer.
pub const KEYWORDS_TAG: &str = "qtkeywords";
/// Marker wrapping the relevance verdict.
pub const RELEVANCE_TAG: &str = "is_ss";

pub fn keywords_prompt(query: &str) -> String {
    format!(
        "Based on the user question below, produce 1-3 short keywords (comma separated) \
that are best suited for searching news articles. Keywords should be concise and \
capture the core topic.\n\
Respond in exactly this format:\n\
<{KEYWORDS_TAG}> keyword1, keyword2, keyword3 <{KEYWORDS_TAG}>\n\n\
User input: {query}\n"
    )
}

pub fn relevance_prompt(query: &str) -> String {
    format!(
        "Judge whether the user question below could be used for news search or public \
sentiment analysis, or relates to technology news. Most questions should pass, but \
refuse small talk.\n\
Briefly explain why, then answer with <{RELEVANCE_TAG}> True <{RELEVANCE_TAG}> or \
<{RELEVANCE_TAG}> False <{RELEVANCE_TAG}>.\n\
---\n\
User input: {query}\n"
    )
}

/// Per-article prompt asking for a JSON object with `summary`, `sentiment` and `ner`.
pub fn analysis_prompt(content: &str) -> String {
    format!(
        "Based on the news article below, produce all of the following:\n\
1. A summary of the article (at most 200 characters, in the article's language)\n\
2. The overall sentiment (exactly one of: positive, neutral, negative)\n\
3. Named entities (people, companies, places), separated by commas\n\
Finally, you MUST output the result in the following JSON format:\n\
{{ \"summary\": \"...\", \"sentiment\": \"...\", \"ner\": \"...\" }}\n\n\
The article:\n{content}"
    )
}

/// Cross-article prompt built from every analyzed article of one search.
pub fn synthesis_prompt(items: &[AnalyzedArticle]) -> String {
    let blocks = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[Article {}]\nTitle: {}\nDate: {}\nSummary: {}\nSentiment: {}\nNER: {}\n",
                i + 1,
                item.article.title,
                item.article.publish_date,
                item.analysis.summary,
                item.analysis.sentiment,
                item.analysis.ner,
            )
        })
        .join("\n\n");

    format!(
        "Below are several news articles with their AI analysis. Combine them into a \
public-opinion summary of at most 300 characters, describing the overall trend and any \
potential risks:\n\n{blocks}"
    )
}
