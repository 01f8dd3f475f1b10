//! Bnext (數位時代, <https://www.bnext.com.tw>) scraping.
//!
//! Search goes through the site's embedded Google custom-search widget, which
//! only renders in a real browser (see [`super::browser`]). This module holds
//! everything that works on plain HTML:
//!
//! - building the search URL
//! - parsing result anchors out of the rendered listing page
//! - spotting anti-automation challenge pages
//! - fetching article pages over HTTP and extracting an [`Article`]
//!
//! # Extraction fallbacks
//!
//! Article pages come in more than one layout, so each field has its own
//! ordered chain and degrades independently:
//!
//! | Field | Tried in order | Sentinel |
//! |-------|----------------|----------|
//! | title | `h1.article-title`, `meta[property="og:title"]` | `title unavailable` |
//! | date | first `span` in the primary date bar, same in the alternate bar, `meta[property="article:published_time"]` (date part) | `date unknown` |
//! | content | every `p` text inside `div.article-content`, joined with `\n` | `content unavailable` |
//!
//! Blank paragraphs are kept as empty lines; only a body with no text at all
//! falls back to the sentinel.

use super::Fetcher;
use crate::config::FetchConfig;
use crate::errors::FetchError;
use crate::models::{Article, SearchHit, CONTENT_UNAVAILABLE, DATE_UNKNOWN, TITLE_UNAVAILABLE};
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Strings whose presence in a listing page means we were served a challenge.
pub const CHALLENGE_MARKERS: [&str; 2] = ["我是機器人", "reCAPTCHA"];

static TITLE_SEL: Lazy<Selector> = Lazy::new(|| sel("h1.article-title"));
static OG_TITLE_SEL: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:title"]"#));
static DATE_PRIMARY_SEL: Lazy<Selector> =
    Lazy::new(|| sel("div.flex.gap-4.text-sm.items-center.flex-wrap"));
static DATE_ALTERNATE_SEL: Lazy<Selector> =
    Lazy::new(|| sel("div.flex.gap-2.items-center.text-sm.text-gray-600"));
static PUBLISHED_META_SEL: Lazy<Selector> =
    Lazy::new(|| sel(r#"meta[property="article:published_time"]"#));
static CONTENT_SEL: Lazy<Selector> = Lazy::new(|| sel("div.article-content"));
static SPAN_SEL: Lazy<Selector> = Lazy::new(|| sel("span"));
static PARAGRAPH_SEL: Lazy<Selector> = Lazy::new(|| sel("p"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Build the search page URL for `keyword`.
///
/// The widget reads the query from the fragment as well as from `q`, so the
/// encoded keyword goes in both places. An empty keyword opens the bare
/// search page.
pub fn build_search_url(search_url: &str, keyword: &str) -> String {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return format!("{search_url}?#gsc.tab=0");
    }
    let encoded = urlencoding::encode(keyword);
    let fragment = format!("gsc.tab=0&gsc.q={encoded}&gsc.sort=");
    format!("{search_url}?q={encoded}#{fragment}")
}

/// The first challenge marker found in `html`, if any.
pub fn detect_challenge(html: &str) -> Option<&'static str> {
    CHALLENGE_MARKERS.into_iter().find(|m| html.contains(m))
}

/// Collect up to `max_results` hits from a rendered listing page.
///
/// Anchors without an href or without visible text are skipped. Relative
/// hrefs are resolved against `base_url`.
pub fn parse_hits(
    html: &str,
    result_selector: &Selector,
    base_url: &str,
    max_results: usize,
) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut hits = Vec::new();
    for element in document.select(result_selector) {
        if hits.len() >= max_results {
            break;
        }
        let href = element.value().attr("href").unwrap_or("").trim();
        if href.is_empty() {
            continue;
        }
        let title = element_text(&element);
        if title.is_empty() {
            continue;
        }
        let url = match base.as_ref().and_then(|b| b.join(href).ok()) {
            Some(resolved) => resolved.to_string(),
            None => href.to_string(),
        };
        hits.push(SearchHit { title, url });
    }
    hits
}

/// Extract a canonical [`Article`] from a fetched page. Never fails.
#[instrument(level = "debug", skip_all, fields(url = %source_url))]
pub fn extract_article(html: &str, source_url: &str) -> Article {
    let document = Html::parse_document(html);

    let article = Article {
        title: extract_title(&document),
        publish_date: extract_publish_date(&document),
        content: extract_content(&document),
        url: source_url.to_string(),
    };
    debug!(
        title = %article.title,
        publish_date = %article.publish_date,
        content_chars = article.content.chars().count(),
        "Extracted article"
    );
    article
}

fn extract_title(document: &Html) -> String {
    first_text(document, &TITLE_SEL)
        .or_else(|| meta_content(document, &OG_TITLE_SEL))
        .unwrap_or_else(|| TITLE_UNAVAILABLE.to_string())
}

fn extract_publish_date(document: &Html) -> String {
    date_bar_text(document, &DATE_PRIMARY_SEL)
        .or_else(|| date_bar_text(document, &DATE_ALTERNATE_SEL))
        .or_else(|| {
            meta_content(document, &PUBLISHED_META_SEL)
                .and_then(|ts| ts.split('T').next().map(str::to_string))
                .filter(|d| !d.is_empty())
        })
        .unwrap_or_else(|| DATE_UNKNOWN.to_string())
}

fn extract_content(document: &Html) -> String {
    let Some(container) = document.select(&CONTENT_SEL).next() else {
        return CONTENT_UNAVAILABLE.to_string();
    };
    let content = container
        .select(&PARAGRAPH_SEL)
        .map(|p| element_text(&p))
        .collect::<Vec<_>>()
        .join("\n");
    if content.trim().is_empty() {
        return CONTENT_UNAVAILABLE.to_string();
    }
    content
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn date_bar_text(document: &Html, selector: &Selector) -> Option<String> {
    let bar = document.select(selector).next()?;
    bar.select(&SPAN_SEL)
        .next()
        .map(|span| element_text(&span))
        .filter(|t| !t.is_empty())
}

/// Plain HTTP fetcher for article pages.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher that sends `config.user_agent` and enforces `config.timeout_secs`.
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, ua);
        } else {
            warn!(user_agent = %config.user_agent, "Invalid user agent; using client default");
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                "Article fetch returned non-success status"
            );
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await.map_err(transport)?;
        info!(bytes = body.len(), "Fetched article page");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FULL_PAGE: &str = r#"
        <html><head>
          <meta property="og:title" content="OG 標題">
          <meta property="article:published_time" content="2024-01-02T08:00:00+08:00">
        </head><body>
          <h1 class="article-title"> 輝達發表新晶片 </h1>
          <div class="flex gap-4 text-sm items-center flex-wrap">
            <span>2025-05-06</span><span>作者</span>
          </div>
          <div class="article-content">
            <p>第一段</p>
            <p>  </p>
            <p>第二段 <a href="/x">連結</a></p>
          </div>
        </body></html>"#;

    const RESULT_CSS: &str = ".gsc-webResult .gsc-thumbnail-inside a.gs-title";
    const LISTING_URL: &str = "https://www.bnext.com.tw/gsearch?q=x";

    fn content_of(html: &str) -> String {
        extract_article(html, "u").content
    }

    #[test]
    fn test_extract_primary_selectors() {
        let a = extract_article(FULL_PAGE, "https://www.bnext.com.tw/article/1");
        assert_eq!(a.title, "輝達發表新晶片");
        assert_eq!(a.publish_date, "2025-05-06");
        assert_eq!(a.content, "第一段\n\n第二段 連結");
        assert_eq!(a.url, "https://www.bnext.com.tw/article/1");
    }

    #[test]
    fn test_title_falls_back_to_og_title() {
        let html = r#"<head><meta property="og:title" content="  Only OG  "></head>"#;
        assert_eq!(extract_article(html, "u").title, "Only OG");
    }

    #[test]
    fn test_title_sentinel() {
        let html = "<html><body><h1>Other heading</h1></body></html>";
        assert_eq!(extract_article(html, "u").title, "title unavailable");
    }

    #[test]
    fn test_empty_heading_falls_through() {
        let html = r#"<html><head><meta property="og:title" content="OG"></head>
            <body><h1 class="article-title">   </h1></body></html>"#;
        assert_eq!(extract_article(html, "u").title, "OG");
    }

    #[test]
    fn test_date_alternate_layout() {
        let html = r#"
            <div class="flex gap-2 items-center text-sm text-gray-600">
              <span> 2025-03-04 </span>
            </div>"#;
        assert_eq!(extract_article(html, "u").publish_date, "2025-03-04");
    }

    #[test]
    fn test_date_bar_without_span_falls_through_to_meta() {
        let html = r#"
            <html><head>
              <meta property="article:published_time" content="2024-01-02T08:00:00+08:00">
            </head><body>
              <div class="flex gap-4 text-sm items-center flex-wrap">no span here</div>
            </body></html>"#;
        assert_eq!(extract_article(html, "u").publish_date, "2024-01-02");
    }

    #[test]
    fn test_date_sentinel() {
        let a = extract_article("<p>nothing</p>", "u");
        assert_eq!(a.publish_date, "date unknown");
    }

    #[test]
    fn test_content_sentinels() {
        assert_eq!(content_of("<p>loose paragraph</p>"), "content unavailable");
        let empty = r#"<div class="article-content"><div>no paragraphs</div></div>"#;
        assert_eq!(content_of(empty), "content unavailable");
        let blank = r#"<div class="article-content"><p> </p><p></p></div>"#;
        assert_eq!(content_of(blank), "content unavailable");
    }

    #[test]
    fn test_blank_paragraphs_stay_as_empty_lines() {
        let html = r#"<div class="article-content"><p>a</p><p> </p><p>b</p></div>"#;
        assert_eq!(content_of(html), "a\n\nb");
    }

    #[test]
    fn test_build_search_url() {
        assert_eq!(
            build_search_url("https://www.bnext.com.tw/gsearch", " AI 晶片 "),
            "https://www.bnext.com.tw/gsearch?q=AI%20%E6%99%B6%E7%89%87#gsc.tab=0&gsc.q=AI%20%E6%99%B6%E7%89%87&gsc.sort="
        );
        assert_eq!(
            build_search_url("https://www.bnext.com.tw/gsearch", "  "),
            "https://www.bnext.com.tw/gsearch?#gsc.tab=0"
        );
    }

    #[test]
    fn test_detect_challenge() {
        assert_eq!(detect_challenge("<div>reCAPTCHA</div>"), Some("reCAPTCHA"));
        assert_eq!(detect_challenge("請確認我是機器人"), Some("我是機器人"));
        assert_eq!(detect_challenge("<div>results</div>"), None);
    }

    #[test]
    fn test_parse_hits() {
        let html = r#"
          <div class="gsc-webResult"><div class="gsc-thumbnail-inside">
            <a class="gs-title" href="https://www.bnext.com.tw/article/1"> 第一篇 </a></div></div>
          <div class="gsc-webResult"><div class="gsc-thumbnail-inside">
            <a class="gs-title" href="/article/2">第二篇</a></div></div>
          <div class="gsc-webResult"><div class="gsc-thumbnail-inside">
            <a class="gs-title" href="/article/3"></a></div></div>
          <div class="gsc-webResult"><div class="gsc-thumbnail-inside">
            <a class="gs-title">no href</a></div></div>
          <div class="gsc-webResult"><div class="gsc-thumbnail-inside">
            <a class="gs-title" href="/article/4">第四篇</a></div></div>
          <a class="gs-title" href="/outside">outside widget</a>
        "#;
        let selector = Selector::parse(RESULT_CSS).unwrap();
        let hits = parse_hits(html, &selector, LISTING_URL, 10);
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(titles, vec!["第一篇", "第二篇", "第四篇"]);
        assert_eq!(
            urls,
            vec![
                "https://www.bnext.com.tw/article/1",
                "https://www.bnext.com.tw/article/2",
                "https://www.bnext.com.tw/article/4",
            ]
        );

        let capped = parse_hits(html, &selector, LISTING_URL, 2);
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_http_fetcher_sends_user_agent() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article/1"))
            .and(header("user-agent", "test-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FULL_PAGE))
            .expect(1)
            .mount(&mock)
            .await;

        let fetcher = HttpFetcher::new(&FetchConfig {
            user_agent: "test-agent".into(),
            timeout_secs: 5,
        })
        .unwrap();
        let url = format!("{}/article/1", mock.uri());
        let body = fetcher.fetch(&url).await.unwrap();
        assert!(body.contains("輝達發表新晶片"));
    }

    #[tokio::test]
    async fn test_http_fetcher_non_success_is_error() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;

        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = format!("{}/gone", mock.uri());
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
