//! Browser-backed search listing.
//!
//! The Bnext search page is a Google custom-search widget that renders results
//! with JavaScript, so it is driven through headless Chrome (chromiumoxide,
//! CDP). One browser is launched per search and closed afterwards.
//!
//! If the page shows an anti-automation challenge, a full-page screenshot is
//! written to `listing.screenshot_dir` before the search fails with
//! [`ListingError::Detection`]. The page is checked once after the settle
//! delay and again if the results never appear.

use super::Lister;
use super::bnext::{detect_challenge, parse_hits};
use crate::config::ListingConfig;
use crate::errors::ListingError;
use crate::models::SearchHit;
use rand::{rng, Rng};
use scraper::Selector;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[cfg(feature = "browser")]
use super::bnext::build_search_url;
#[cfg(feature = "browser")]
use chromiumoxide::page::ScreenshotParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tracing::{info, instrument};

/// File name of the screenshot captured when a challenge page is detected.
pub const CHALLENGE_SCREENSHOT: &str = "captcha_detected.png";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The operations the listing flow needs from an open browser tab.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
trait SearchPage {
    /// Current rendered HTML.
    async fn html(&self) -> Result<String, ListingError>;

    /// Whether `selector` matches anything on the page right now.
    async fn has_match(&self, selector: &str) -> bool;

    /// Write a full-page screenshot to `path`.
    async fn capture_to(&self, path: &Path) -> Result<(), ListingError>;
}

#[cfg(feature = "browser")]
impl SearchPage for Page {
    async fn html(&self) -> Result<String, ListingError> {
        self.content()
            .await
            .map_err(|e| {
                ListingError::Browser(format!("failed to read page: {e}"))
            })
    }

    async fn has_match(&self, selector: &str) -> bool {
        self.find_element(selector).await.is_ok()
    }

    async fn capture_to(&self, path: &Path) -> Result<(), ListingError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(|e| {
                ListingError::Browser(format!("screenshot failed: {e}"))
            })
    }
}

/// Lists search hits by rendering the search page in Chrome.
#[derive(Debug, Clone)]
pub struct BrowserLister {
    config: ListingConfig,
}

impl BrowserLister {
    pub fn new(config: ListingConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "browser")]
impl BrowserLister {
    async fn launch(&self) -> Result<(Browser, tokio::task::JoinHandle<()>), ListingError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--user-agent={}", self.config.user_agent));
        if !self.config.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ListingError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| {
                ListingError::Browser(format!("failed to launch browser: {e}"))
            })?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });
        Ok((browser, handle))
    }
}

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
impl BrowserLister {
    /// Wait a randomised moment so the widget can finish rendering.
    async fn settle(&self) {
        let (lo, hi) = self.config.settle_delay_ms;
        let ms = if hi > lo {
            rng().random_range(lo..=hi)
        } else {
            lo
        };
        debug!(delay_ms = ms, "Waiting for search widget");
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn capture_screenshot<P: SearchPage>(&self, page: &P) -> Option<PathBuf> {
        let dir = &self.config.screenshot_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(error = %e, dir = %dir.display(), "Cannot create screenshot directory");
            return None;
        }
        let path = dir.join(CHALLENGE_SCREENSHOT);
        match page.capture_to(&path).await {
            Ok(()) => {
                warn!(path = %path.display(), "Saved challenge screenshot");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "Failed to capture challenge screenshot");
                None
            }
        }
    }

    /// Screenshot the challenge page and build the error that ends the search.
    async fn challenge<P: SearchPage>(&self, page: &P, marker: &str) -> ListingError {
        warn!(marker, "Challenge page detected");
        let screenshot = self.capture_screenshot(page).await;
        ListingError::Detection {
            marker: marker.to_string(),
            screenshot,
        }
    }

    /// Poll until the result selector matches or the wait budget runs out.
    async fn wait_for_results<P: SearchPage>(&self, page: &P) -> Result<(), ListingError> {
        let secs = self.config.wait_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(secs);
        loop {
            if page.has_match(&self.config.result_selector).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ListingError::Timeout(secs));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn search_on_page<P: SearchPage>(
        &self,
        page: &P,
        search_url: &str,
        selector: &Selector,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ListingError> {
        self.settle().await;

        let html = page.html().await?;
        if let Some(marker) = detect_challenge(&html) {
            return Err(self.challenge(page, marker).await);
        }

        if let Err(e) = self.wait_for_results(page).await {
            // The widget can swap in a challenge after the first check.
            let html = page.html().await?;
            if let Some(marker) = detect_challenge(&html) {
                return Err(self.challenge(page, marker).await);
            }
            return Err(e);
        }

        let html = page.html().await?;
        Ok(parse_hits(&html, selector, search_url, max_results))
    }
}

#[cfg(feature = "browser")]
impl Lister for BrowserLister {
    #[instrument(level = "info", skip_all, fields(%keyword, max_results))]
    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ListingError> {
        let t0 = Instant::now();
        let raw_selector = &self.config.result_selector;
        let selector = Selector::parse(raw_selector).map_err(|e| {
            ListingError::Browser(format!("invalid result selector {raw_selector:?}: {e}"))
        })?;
        let search_url = build_search_url(&self.config.search_url, keyword);
        info!(%search_url, "Opening search page");

        let (mut browser, handle) = self.launch().await?;
        let result = match browser.new_page(search_url.as_str()).await {
            Ok(page) => {
                let res = self
                    .search_on_page(&page, &search_url, &selector, max_results)
                    .await;
                let _ = page.close().await;
                res
            }
            Err(e) => Err(ListingError::Browser(format!(
                "failed to open search page: {e}"
            ))),
        };

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser close reported an error");
        }
        handle.abort();

        match &result {
            Ok(hits) => info!(
                count = hits.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Listed search hits"
            ),
            Err(e) => error!(error = %e, "Search listing failed"),
        }
        result
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
impl Lister for BrowserLister {
    async fn search(
        &self,
        _keyword: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>, ListingError> {
        Err(ListingError::Unavailable(
            "browser support not compiled; rebuild with `--features browser`".to_string(),
        ))
    }
}
