//! Text-completion gateway.
//!
//! Everything that needs a language model goes through the [`TextCompletion`]
//! trait: a prompt string goes in and the model's raw text comes out. The
//! trait keeps the parsers and the orchestrator independent of the backend,
//! and lets tests substitute a scripted model.
//!
//! [`LlmGateway`] is the production implementation and speaks one of two wire
//! protocols, selected by [`Provider`]:
//!
//! | Provider | Request | Answer field |
//! |----------|---------|--------------|
//! | `ollama` | `POST {endpoint}/api/generate` | `response` |
//! | `openai` | `POST {endpoint}/chat/completions` | `choices[0].message.content` |
//!
//! Calls are never retried here. A failed call comes back as a typed
//! [`GatewayError`] so callers can tell "the query failed" apart from "the
//! model answered with something unparseable".

use crate::config::{GatewayConfig, Provider};
use crate::errors::GatewayError;
use crate::utils::truncate_for_log;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Trait for async text completion.
///
/// Implementors send a prompt to a language model and return its raw answer.
pub trait TextCompletion {
    /// Send `prompt` to the model and return its text response.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the model could not be queried at all.
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;
}

impl<T: TextCompletion> TextCompletion for &T {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        (**self).complete(prompt).await
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// HTTP client for an Ollama or OpenAI-compatible completion endpoint.
pub struct LlmGateway {
    config: GatewayConfig,
    client: Client,
}

impl fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.config.provider)
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field(
                "api_key",
                &self.config.api_key.as_deref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl LlmGateway {
    /// Build a gateway whose HTTP client enforces `config.timeout_secs`.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn ollama(&self, prompt: &str) -> Result<String, GatewayError> {
        let body = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };
        let resp = self
            .client
            .post(self.url("api/generate"))
            .json(&body)
            .send()
            .await?;
        let parsed: OllamaResponse = check_status(resp).await?.json().await?;
        Ok(parsed.response)
    }

    async fn openai(&self, prompt: &str) -> Result<String, GatewayError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };
        let mut req = self.client.post(self.url("chat/completions")).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let parsed: ChatResponse = check_status(req.send().await?).await?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::Decode("no message content".to_string()))
    }
}

impl TextCompletion for LlmGateway {
    #[instrument(
        level = "info",
        skip_all,
        fields(provider = ?self.config.provider, model = %self.config.model)
    )]
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let t0 = Instant::now();
        let res = match self.config.provider {
            Provider::Ollama => self.ollama(prompt).await,
            Provider::OpenAI => self.openai(prompt).await,
        };
        let dt = t0.elapsed();

        match &res {
            Ok(text) => {
                info!(
                    elapsed_ms = dt.as_millis() as u64,
                    bytes = text.len(),
                    "Model call succeeded"
                );
                debug!(response_preview = %truncate_for_log(text, 300), "Raw model response");
            }
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "Model call failed"),
        }
        res
    }
}

/// Map non-success statuses onto the connector error taxonomy.
async fn check_status(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(GatewayError::Auth { status: code })
        }
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::Quota { status: code }),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(GatewayError::Status {
                status: code,
                body: truncate_for_log(&body, 200),
            })
        }
    }
}
