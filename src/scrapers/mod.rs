//! Search listing and article fetching.
//!
//! Scraping follows the same two-phase pattern as a news indexer:
//!
//! 1. **Listing**: turn a keyword into an ordered list of [`SearchHit`]s
//! 2. **Fetching**: download each hit's page, then extract an [`crate::models::Article`]
//!
//! Both phases sit behind a trait so the orchestrator can run against fakes:
//!
//! | Trait | Production implementation | Notes |
//! |-------|---------------------------|-------|
//! | [`Lister`] | [`browser::BrowserLister`] | Headless Chrome; captures a screenshot on challenge pages |
//! | [`Fetcher`] | [`bnext::HttpFetcher`] | Plain HTTP; non-2xx is an error |
//!
//! Extraction itself ([`bnext::extract_article`]) is a pure function over HTML.

use crate::errors::{FetchError, ListingError};
use crate::models::SearchHit;

pub mod bnext;
pub mod browser;

/// Produces search hits for a keyword.
pub trait Lister {
    /// Return at most `max_results` hits in listing order.
    ///
    /// # Errors
    ///
    /// [`ListingError::Detection`] when an anti-automation challenge is served,
    /// other variants for browser or timeout failures.
    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ListingError>;
}

/// Downloads article pages.
pub trait Fetcher {
    /// Return the HTML body at `url`.
    ///
    /// # Errors
    ///
    /// Fails on transport errors and non-2xx statuses.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl<T: Lister> Lister for &T {
    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ListingError> {
        (**self).search(keyword, max_results).await
    }
}

impl<T: Fetcher> Fetcher for &T {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}
