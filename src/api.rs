//! Gemini API interaction.
//!
//! This module talks to the Generative Language REST API. The pipeline only
//! sees the [`AskAsync`] trait, so tests substitute a fake that returns
//! canned text.
//!
//! # Failure model
//!
//! One attempt per analysis, no retry. Every failure is a [`ProviderError`];
//! the orchestrator treats it as fatal and reports "Gemini API call failed".

use crate::config::Settings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::utils::truncate_for_log;

/// Everything that can go wrong when calling the model provider.
///
/// Wrapped `reqwest` errors have their request URL stripped, so the
/// `Display` output is safe to log.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("request to model provider failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("model provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode model provider response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("model provider returned no text ({0})")]
    EmptyResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.without_url())
        } else {
            ProviderError::Transport(e.without_url())
        }
    }
}

/// Trait for async LLM interaction.
///
/// Implementors send a prompt to a language model and return its raw text
/// reply, with no structure guaranteed.
#[async_trait]
pub trait AskAsync: Send + Sync {
    /// Send `prompt` to the model and return the raw reply.
    async fn ask(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Provider model listing, passed through unchanged.
    async fn list_models(&self) -> Result<serde_json::Value, ProviderError>;

    /// Identifier of the model answering [`AskAsync::ask`].
    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String, ProviderError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::EmptyResponse(format!("prompt blocked: {reason}")));
        }
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(ProviderError::EmptyResponse("no candidates".to_string()));
        };
        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "empty candidate".to_string());
            return Err(ProviderError::EmptyResponse(reason));
        }
        Ok(text)
    }
}

/// Header carrying the API key, kept out of request URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiClient {
    /// Build a client from resolved settings.
    ///
    /// # Arguments
    /// * `settings` - Supplies the API base, key and model id. A trailing `/`
    ///   on the base and a leading `models/` on the model are dropped, and an
    ///   empty key counts as missing.
    ///
    /// # Returns
    /// The client, or [`ProviderError::Transport`] if the HTTP client could
    /// not be constructed. A missing key is only reported when a call is made.
    pub fn new(settings: &Settings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: Client::builder().build()?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            model: settings
                .model
                .trim_start_matches("models/")
                .to_string(),
        })
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    async fn generate(&self, body: &GenerateRequest<'_>) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );
        let resp = self
            .http
            .post(url)
            .header(API_KEY_HEADER, self.key()?)
            .json(body)
            .send()
            .await?;
        let resp = Self::error_for_status(resp).await?;
        resp.json::<GenerateResponse>().await?.into_text()
    }

    async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status,
            body: truncate_for_log(&body, 300),
        })
    }
}

#[async_trait]
impl AskAsync for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String, ProviderError> {
        let t0 = Instant::now();
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let res = self.generate(&body).await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &res {
            Ok(text) => info!(elapsed_ms, chars = text.len(), "Model call succeeded"),
            Err(e) => warn!(elapsed_ms, error = %e, "Model call failed"),
        }
        res
    }

    #[instrument(level = "info", skip_all)]
    async fn list_models(&self) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/v1beta/models", self.api_base);
        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, self.key()?)
            .send()
            .await?;
        let resp = Self::error_for_status(resp).await?;
        Ok(resp.json().await?)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
