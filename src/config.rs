//! Runtime configuration.
//!
//! Configuration is an explicit value built once in `main` and handed to each
//! component at construction. It is read from an optional YAML file; every
//! section and field has a default so a partial (or absent) file works.
//!
//! ```yaml
//! gateway:
//!   provider: ollama
//!   endpoint: http://localhost:11434
//!   model: gemma2:27b-instruct-q5_0
//! listing:
//!   max_results: 3
//!   headless: true
//! store:
//!   path: ./data/news_all.db
//! ```

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// Which wire protocol the text-completion endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// `POST /api/generate` on an Ollama server.
    #[default]
    Ollama,
    /// `POST /chat/completions` on any OpenAI-compatible server.
    OpenAI,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub listing: ListingConfig,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

/// Text-completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub provider: Provider,
    /// Base URL; provider paths are appended to it.
    pub endpoint: String,
    pub model: String,
    /// Bearer token for OpenAI-compatible providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            model: "gemma2:27b-instruct-q5_0".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.3,
        }
    }
}

/// Search listing (browser automation) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub search_url: String,
    /// CSS selector matching one anchor per search result.
    pub result_selector: String,
    pub headless: bool,
    pub max_results: usize,
    /// Lower and upper bound of the randomised wait after page load.
    pub settle_delay_ms: (u64, u64),
    pub wait_timeout_secs: u64,
    /// Where to write the screenshot taken when a challenge page shows up.
    pub screenshot_dir: PathBuf,
    pub user_agent: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.bnext.com.tw/gsearch".to_string(),
            result_selector: ".gsc-webResult .gsc-thumbnail-inside a.gs-title".to_string(),
            headless: true,
            max_results: 3,
            settle_delay_ms: (3000, 6000),
            wait_timeout_secs: 20,
            screenshot_dir: PathBuf::from("."),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Article page fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/news_all.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget for each per-article step: the fetch, then the analysis and store.
    pub article_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            article_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or return the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is not valid YAML
    /// for this schema.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an empty map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}
