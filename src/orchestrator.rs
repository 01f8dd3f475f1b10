//! Search orchestration.
//!
//! One request runs the stages below strictly in order, awaiting each before
//! starting the next:
//!
//! ```text
//! Idle -> ValidatingRelevance -> ExtractingKeyword -> Listing
//!      -> FetchingDetails -> AnalyzingEach(n) -> Synthesizing -> Done
//! ```
//!
//! `Rejected`, `NoKeyword` and `NoResults` are terminal early exits that
//! persist nothing. Each analysis is stored as soon as it is computed, so a
//! failure later in the batch (or in synthesis) never loses earlier records.
//! Nothing is retried.

use crate::api::TextCompletion;
use crate::errors::SearchError;
use crate::llm::keywords::extract_keywords;
use crate::llm::relevance::is_on_topic;
use crate::llm::synthesis::{analyze_article, synthesize, Synthesis};
use crate::models::{AnalyzedArticle, Article, SearchHit};
use crate::scrapers::bnext::extract_article;
use crate::scrapers::{Fetcher, Lister};
use crate::store::ResultStore;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ValidatingRelevance,
    ExtractingKeyword,
    Listing,
    FetchingDetails,
    /// Analyzing article `current` (1-based) of `total`.
    AnalyzingEach { current: usize, total: usize },
    Synthesizing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => f.write_str("idle"),
            Stage::ValidatingRelevance => f.write_str("validating relevance"),
            Stage::ExtractingKeyword => f.write_str("extracting keyword"),
            Stage::Listing => f.write_str("listing search results"),
            Stage::FetchingDetails => f.write_str("fetching article details"),
            Stage::AnalyzingEach { current, total } => {
                write!(f, "analyzing article {current}/{total}")
            }
            Stage::Synthesizing => f.write_str("synthesizing"),
            Stage::Done => f.write_str("done"),
        }
    }
}

/// Everything a completed request produced.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    /// The user's question, or the keyword itself for direct crawls.
    pub query: String,
    pub keyword: String,
    pub articles: Vec<AnalyzedArticle>,
    /// `None` for direct keyword crawls, which skip synthesis.
    pub synthesis: Option<Synthesis>,
}

/// How a request ended, short of an error.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// The relevance check judged the query unsuited to news search.
    Rejected,
    /// The model produced no usable keyword.
    NoKeyword,
    /// The listing returned no hits for `keyword`.
    NoResults { keyword: String },
    Completed(SearchReport),
}

/// Runs search requests against a gateway, a lister, a fetcher and a store.
pub struct Orchestrator<G, L, F, S> {
    gateway: G,
    lister: L,
    fetcher: F,
    store: S,
    max_results: usize,
    article_timeout: Duration,
}

impl<G, L, F, S> Orchestrator<G, L, F, S>
where
    G: TextCompletion,
    L: Lister,
    F: Fetcher,
    S: ResultStore,
{
    /// # Arguments
    ///
    /// * `max_results` - listing cap used by [`Orchestrator::run`]
    /// * `article_timeout` - budget for fetching one article, and separately
    ///   for analyzing and storing it
    pub fn new(
        gateway: G,
        lister: L,
        fetcher: F,
        store: S,
        max_results: usize,
        article_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            lister,
            fetcher,
            store,
            max_results,
            article_timeout,
        }
    }

    /// Answer a free-form question: check relevance, extract a keyword, then
    /// list, fetch, analyze, store and synthesize.
    ///
    /// `on_stage` is called on every stage transition.
    ///
    /// # Errors
    ///
    /// Gateway, listing, fetch and store failures abort the request with the
    /// failing stage attached. Records stored before the failure remain.
    #[instrument(level = "info", skip_all, fields(%query))]
    pub async fn run(
        &self,
        query: &str,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<SearchOutcome, SearchError> {
        let t0 = Instant::now();
        enter(&mut on_stage, Stage::Idle);

        enter(&mut on_stage, Stage::ValidatingRelevance);
        let relevant = is_on_topic(&self.gateway, query)
            .await
            .map_err(|source| SearchError::Gateway {
                stage: "relevance check",
                source,
            })?;
        if !relevant {
            info!("Query rejected as off-topic");
            return Ok(SearchOutcome::Rejected);
        }

        enter(&mut on_stage, Stage::ExtractingKeyword);
        let keyword = extract_keywords(&self.gateway, query)
            .await
            .map_err(|source| SearchError::Gateway {
                stage: "keyword extraction",
                source,
            })?;
        if keyword.is_empty() {
            info!("No keyword extracted");
            return Ok(SearchOutcome::NoKeyword);
        }

        let limit = self.max_results;
        let Some(articles) = self.collect(&keyword, limit, &mut on_stage).await? else {
            return Ok(SearchOutcome::NoResults { keyword });
        };

        enter(&mut on_stage, Stage::Synthesizing);
        let synthesis = synthesize(&self.gateway, &articles).await;

        enter(&mut on_stage, Stage::Done);
        info!(
            count = articles.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(SearchOutcome::Completed(SearchReport {
            query: query.to_string(),
            keyword,
            articles,
            synthesis: Some(synthesis),
        }))
    }

    /// Crawl a keyword directly: no relevance check, no keyword extraction
    /// and no synthesis. Every hit is fetched, analyzed and stored.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::run`].
    #[instrument(level = "info", skip_all, fields(%keyword, max_results))]
    pub async fn run_keyword(
        &self,
        keyword: &str,
        max_results: usize,
        mut on_stage: impl FnMut(Stage),
    ) -> Result<SearchOutcome, SearchError> {
        let t0 = Instant::now();
        enter(&mut on_stage, Stage::Idle);

        let Some(articles) = self.collect(keyword, max_results, &mut on_stage).await? else {
            return Ok(SearchOutcome::NoResults {
                keyword: keyword.to_string(),
            });
        };

        enter(&mut on_stage, Stage::Done);
        info!(
            count = articles.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Crawl complete"
        );
        Ok(SearchOutcome::Completed(SearchReport {
            query: keyword.to_string(),
            keyword: keyword.to_string(),
            articles,
            synthesis: None,
        }))
    }

    /// List, fetch, then analyze and store each article in listing order.
    /// `None` means the listing was empty.
    async fn collect(
        &self,
        keyword: &str,
        max_results: usize,
        on_stage: &mut impl FnMut(Stage),
    ) -> Result<Option<Vec<AnalyzedArticle>>, SearchError> {
        enter(on_stage, Stage::Listing);
        let hits = self.lister.search(keyword, max_results).await?;
        if hits.is_empty() {
            info!(%keyword, "Listing returned no hits");
            return Ok(None);
        }

        enter(on_stage, Stage::FetchingDetails);
        let mut articles = Vec::with_capacity(hits.len());
        for hit in &hits {
            articles.push(self.fetch_article(hit).await?);
        }

        let total = articles.len();
        let mut analyzed = Vec::with_capacity(total);
        for (i, article) in articles.into_iter().enumerate() {
            let stage = Stage::AnalyzingEach {
                current: i + 1,
                total,
            };
            enter(on_stage, stage);
            analyzed.push(self.analyze_and_store(article).await?);
        }
        Ok(Some(analyzed))
    }

    async fn fetch_article(&self, hit: &SearchHit) -> Result<Article, SearchError> {
        debug!(title = %hit.title, url = %hit.url, "Fetching article");
        let fetch = async {
            let page = self.fetcher.fetch(&hit.url).await;
            page.map_err(SearchError::from)
        };
        let html = self.within_budget(&hit.url, fetch).await?;
        Ok(extract_article(&html, &hit.url))
    }

    async fn analyze_and_store(&self, article: Article) -> Result<AnalyzedArticle, SearchError> {
        let url = article.url.clone();
        self.within_budget(&url, async {
            let analysis = analyze_article(&self.gateway, &article)
                .await
                .map_err(|source| SearchError::Gateway {
                    stage: "article analysis",
                    source,
                })?;
            if !analysis.has_conventional_sentiment() {
                let sentiment = &analysis.sentiment;
                warn!(url = %article.url, %sentiment, "Unconventional sentiment stored as-is");
            }
            let id = self.store.append(&article, &analysis).await?;
            Ok(AnalyzedArticle {
                id,
                article,
                analysis,
            })
        })
        .await
    }

    async fn within_budget<T>(
        &self,
        url: &str,
        fut: impl Future<Output = Result<T, SearchError>>,
    ) -> Result<T, SearchError> {
        match tokio::time::timeout(self.article_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(%url, secs = self.article_timeout.as_secs(), "Article processing timed out");
                Err(SearchError::ArticleTimeout {
                    url: url.to_string(),
                    secs: self.article_timeout.as_secs(),
                })
            }
        }
    }
}

fn enter(on_stage: &mut impl FnMut(Stage), stage: Stage) {
    info!(stage = %stage, "Stage");
    on_stage(stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FetchError, GatewayError, ListingError};
    use crate::store::SqliteStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    const RELEVANT: &str = "<is_ss> asks about industry news. True <is_ss>";
    const KEYWORDS: &str = "<qtkeywords> AI, 晶片 <qtkeywords>";

    fn analysis_json(sentiment: &str) -> String {
        format!(r#"{{"summary":"s","sentiment":"{sentiment}","ner":"台積電"}}"#)
    }

    /// Replies with a fixed script, one entry per call.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl TextCompletion for Scripted {
        async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GatewayError::Decode("script exhausted".into())))
        }
    }

    struct FakeLister {
        hits: Vec<SearchHit>,
        detect: bool,
        calls: AtomicUsize,
    }

    impl FakeLister {
        fn with_hits(n: usize) -> Self {
            let hits = (1..=n)
                .map(|i| SearchHit {
                    title: format!("hit {i}"),
                    url: format!("https://www.bnext.com.tw/article/{i}"),
                })
                .collect();
            Self {
                hits,
                detect: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Lister for FakeLister {
        async fn search(
            &self,
            _keyword: &str,
            max_results: usize,
        ) -> Result<Vec<SearchHit>, ListingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.detect {
                return Err(ListingError::Detection {
                    marker: "reCAPTCHA".into(),
                    screenshot: None,
                });
            }
            Ok(self.hits.iter().take(max_results).cloned().collect())
        }
    }

    struct FakeFetcher {
        delay: Option<Duration>,
        fail: bool,
    }

    impl FakeFetcher {
        fn ok() -> Self {
            Self {
                delay: None,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                delay: None,
                fail: true,
            }
        }
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            let n = url.rsplit('/').next().unwrap_or("0");
            Ok(format!(
                r#"<html><head>
                <meta property="article:published_time" content="2025-05-0{n}T08:00:00+08:00">
                </head><body><h1 class="article-title">Article {n}</h1>
                <div class="article-content"><p>AI body {n}</p></div></body></html>"#
            ))
        }
    }

    async fn store() -> (TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("news.db");
        let store = SqliteStore::open(path).await.unwrap();
        (dir, store)
    }

    async fn stored(store: &SqliteStore) -> usize {
        let records = store.query("", "0000-00-00", "9999-99-99").await.unwrap();
        records.len()
    }

    fn analyzing(current: usize, total: usize) -> Stage {
        Stage::AnalyzingEach { current, total }
    }

    fn orchestrator<'a>(
        gateway: &'a Scripted,
        lister: &'a FakeLister,
        fetcher: &'a FakeFetcher,
        store: &'a SqliteStore,
    ) -> Orchestrator<&'a Scripted, &'a FakeLister, &'a FakeFetcher, &'a SqliteStore> {
        Orchestrator::new(gateway, lister, fetcher, store, 3, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_synthesis_failure_keeps_stored_records() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![
            Ok(RELEVANT.into()),
            Ok(KEYWORDS.into()),
            Ok(analysis_json("positive")),
            Ok(format!("Sure! {}", analysis_json("negative"))),
            Err(GatewayError::Quota { status: 429 }),
        ]);
        let lister = FakeLister::with_hits(2);
        let fetcher = FakeFetcher::ok();

        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("台積電最近的新聞?", |_| {})
            .await
            .unwrap();

        let SearchOutcome::Completed(report) = outcome else {
            panic!("expected a completed search");
        };
        assert_eq!(report.keyword, "AI");
        assert_eq!(report.articles.len(), 2);
        assert_eq!(report.articles[0].article.title, "Article 1");
        assert_eq!(report.articles[1].analysis.sentiment, "negative");
        assert!(matches!(report.synthesis, Some(Synthesis::Unavailable(_))));
        assert_eq!(stored(&store).await, 2);
    }

    #[tokio::test]
    async fn test_stage_sequence() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![
            Ok(RELEVANT.into()),
            Ok(KEYWORDS.into()),
            Ok(analysis_json("neutral")),
            Ok(analysis_json("neutral")),
            Ok("整體趨勢正面".into()),
        ]);
        let lister = FakeLister::with_hits(2);
        let fetcher = FakeFetcher::ok();

        let mut stages = Vec::new();
        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI 晶片", |s| stages.push(s))
            .await
            .unwrap();

        assert_eq!(
            stages,
            vec![
                Stage::Idle,
                Stage::ValidatingRelevance,
                Stage::ExtractingKeyword,
                Stage::Listing,
                Stage::FetchingDetails,
                analyzing(1, 2),
                analyzing(2, 2),
                Stage::Synthesizing,
                Stage::Done,
            ]
        );
        let SearchOutcome::Completed(report) = outcome else {
            panic!("expected a completed search");
        };
        let expected = Synthesis::Ready("整體趨勢正面".into());
        assert_eq!(report.synthesis, Some(expected));
    }

    #[tokio::test]
    async fn test_rejected_query_lists_nothing() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok("<is_ss> cooking recipe. False <is_ss>".into())]);
        let lister = FakeLister::with_hits(2);
        let fetcher = FakeFetcher::ok();

        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("how do I bake bread", |_| {})
            .await
            .unwrap();

        assert!(matches!(outcome, SearchOutcome::Rejected));
        assert_eq!(gateway.calls(), 1);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored(&store).await, 0);
    }

    #[tokio::test]
    async fn test_untagged_keyword_reply_is_no_keyword() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok(RELEVANT.into()), Ok("AI, 晶片".into())]);
        let lister = FakeLister::with_hits(2);
        let fetcher = FakeFetcher::ok();

        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI 晶片", |_| {})
            .await
            .unwrap();

        assert!(matches!(outcome, SearchOutcome::NoKeyword));
        assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_results() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok(RELEVANT.into()), Ok(KEYWORDS.into())]);
        let lister = FakeLister::with_hits(0);
        let fetcher = FakeFetcher::ok();

        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI 晶片", |_| {})
            .await
            .unwrap();

        match outcome {
            SearchOutcome::NoResults { keyword } => assert_eq!(keyword, "AI"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_mid_batch_failure_keeps_earlier_records() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![
            Ok(RELEVANT.into()),
            Ok(KEYWORDS.into()),
            Ok(analysis_json("positive")),
            Err(GatewayError::Timeout),
        ]);
        let lister = FakeLister::with_hits(3);
        let fetcher = FakeFetcher::ok();

        let err = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI 晶片", |_| {})
            .await
            .unwrap_err();

        match err {
            SearchError::Gateway { stage, .. } => assert_eq!(stage, "article analysis"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stored(&store).await, 1);
    }

    #[tokio::test]
    async fn test_relevance_gateway_error_is_surfaced() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Err(GatewayError::Auth { status: 401 })]);
        let lister = FakeLister::with_hits(1);
        let fetcher = FakeFetcher::ok();

        let err = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI", |_| {})
            .await
            .unwrap_err();
        match err {
            SearchError::Gateway { stage, .. } => assert_eq!(stage, "relevance check"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_detection_aborts_request() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok(RELEVANT.into()), Ok(KEYWORDS.into())]);
        let mut lister = FakeLister::with_hits(2);
        lister.detect = true;
        let fetcher = FakeFetcher::ok();

        let err = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI", |_| {})
            .await
            .unwrap_err();
        let SearchError::Listing(listing) = err else {
            panic!("expected a listing error");
        };
        assert!(matches!(listing, ListingError::Detection { .. }));
        assert_eq!(stored(&store).await, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_analysis() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok(RELEVANT.into()), Ok(KEYWORDS.into())]);
        let lister = FakeLister::with_hits(2);
        let fetcher = FakeFetcher::failing();

        let err = orchestrator(&gateway, &lister, &fetcher, &store)
            .run("AI", |_| {})
            .await
            .unwrap_err();
        let SearchError::Fetch(fetch) = err else {
            panic!("expected a fetch error");
        };
        assert!(matches!(fetch, FetchError::Status { status: 404, .. }));
        assert_eq!(gateway.calls(), 2);
        assert_eq!(stored(&store).await, 0);
    }

    #[tokio::test]
    async fn test_slow_fetch_hits_article_budget() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![Ok(RELEVANT.into()), Ok(KEYWORDS.into())]);
        let lister = FakeLister::with_hits(1);
        let fetcher = FakeFetcher {
            delay: Some(Duration::from_secs(10)),
            fail: false,
        };

        let budget = Duration::from_millis(50);
        let orch = Orchestrator::new(&gateway, &lister, &fetcher, &store, 3, budget);
        let err = orch.run("AI", |_| {}).await.unwrap_err();
        assert!(matches!(err, SearchError::ArticleTimeout { .. }));
    }

    #[tokio::test]
    async fn test_run_keyword_skips_llm_preamble_and_synthesis() {
        let (_dir, store) = store().await;
        let gateway = Scripted::new(vec![
            Ok(analysis_json("positive")),
            Ok(analysis_json("mixed")),
        ]);
        let lister = FakeLister::with_hits(5);
        let fetcher = FakeFetcher::ok();

        let outcome = orchestrator(&gateway, &lister, &fetcher, &store)
            .run_keyword("AI", 2, |_| {})
            .await
            .unwrap();

        let SearchOutcome::Completed(report) = outcome else {
            panic!("expected a completed crawl");
        };
        assert_eq!(report.articles.len(), 2);
        assert!(report.synthesis.is_none());
        assert_eq!(report.articles[1].analysis.sentiment, "mixed");
        assert_eq!(gateway.calls(), 2);

        let (from, to) = ("2025-05-01", "2025-05-31");
        let records = store.query("AI", from, to).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].publish_date, "2025-05-02");
        assert_eq!(records[1].sentiment, "positive");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(analyzing(2, 3).to_string(), "analyzing article 2/3");
        assert_eq!(Stage::Listing.to_string(), "listing search results");
    }
}
