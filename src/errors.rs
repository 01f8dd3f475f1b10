//! Error types for every external interface the pipeline talks to.
//!
//! Transport and detection failures are surfaced to the user and abort the
//! current request. Model formatting problems never show up here: they are
//! absorbed by the fallbacks in [`crate::llm`].

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a text-completion call.
///
/// An `Err` means "the query failed". A model that answered with unusable
/// text still yields `Ok`, and the parsers fall back from there.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("network error talking to model endpoint: {0}")]
    Network(#[source] reqwest::Error),

    #[error("model endpoint timed out")]
    Timeout,

    #[error("model endpoint rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("model endpoint quota exhausted (HTTP {status})")]
    Quota { status: u16 },

    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode model endpoint response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Network(e)
        }
    }
}

/// Failure of the search listing step.
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("challenge detected ({marker}); screenshot: {}", saved_at(screenshot))]
    Detection {
        marker: String,
        screenshot: Option<PathBuf>,
    },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("timed out waiting for search results after {0}s")]
    Timeout(u64),

    #[error("browser listing unavailable: {0}")]
    Unavailable(String),
}

fn saved_at(screenshot: &Option<PathBuf>) -> String {
    match screenshot {
        Some(path) => path.display().to_string(),
        None => "not captured".to_string(),
    }
}

/// Failure fetching an article page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of the result store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A surfaced failure that aborted one search request.
///
/// Records persisted before the failure stay in the store.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("model call failed during {stage}: {source}")]
    Gateway {
        stage: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("search listing failed: {0}")]
    Listing(#[from] ListingError),

    #[error("article fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("article {url} exceeded its {secs}s processing budget")]
    ArticleTimeout { url: String, secs: u64 },

    #[error("could not persist analysis: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_message_mentions_screenshot() {
        let e = ListingError::Detection {
            marker: "reCAPTCHA".into(),
            screenshot: Some(PathBuf::from("./captcha_detected.png")),
        };
        let msg = e.to_string();
        assert!(msg.contains("reCAPTCHA"));
        assert!(msg.contains("captcha_detected.png"));

        let e = ListingError::Detection {
            marker: "reCAPTCHA".into(),
            screenshot: None,
        };
        assert!(e.to_string().contains("not captured"));
    }

    #[test]
    fn test_search_error_names_stage() {
        let e = SearchError::Gateway {
            stage: "relevance check",
            source: GatewayError::Quota { status: 429 },
        };
        assert_eq!(
            e.to_string(),
            "model call failed during relevance check: model endpoint quota exhausted (HTTP 429)"
        );
    }
}
