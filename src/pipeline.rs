//! The analysis pipeline: fetch → prompt → model → extract.
//!
//! [`Analyzer`] sequences the stages for one request and records an ordered
//! execution log. Each milestone is also pushed to an optional subscriber
//! channel as it happens, so a CLI or SSE stream can render progress live.
//!
//! # Failure handling
//!
//! | Failure | Outcome |
//! |---------|---------|
//! | missing / invalid URL, bad body | [`AnalysisError`], no network calls |
//! | page fetch fails | placeholder text, pipeline continues |
//! | model call fails | [`AnalysisError::Provider`], request aborted |
//! | model reply unparseable | fallback analysis, request succeeds |

use crate::api::{AskAsync, ProviderError};
use crate::extract::extract;
use crate::fetcher::{FetchAsync, Fetched};
use crate::models::{
    AnalysisRequest, AnalysisResponse, AnalysisResult, Progress, Stage, iso_timestamp,
};
use crate::prompt::build_prompt;
use crate::utils::truncate_for_log;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Failures that end a request without a result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid JSON body")]
    InvalidBody(#[source] serde_json::Error),
    #[error("URL is required")]
    MissingUrl,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Gemini API call failed")]
    Provider(#[from] ProviderError),
    #[error("Request timed out")]
    TimedOut,
}

impl AnalysisError {
    /// The error as a failure envelope.
    pub fn to_response(&self) -> AnalysisResponse {
        AnalysisResponse::failure(self.to_string())
    }
}

impl AnalysisRequest {
    /// Parse a raw request body.
    pub fn from_json(body: &[u8]) -> Result<Self, AnalysisError> {
        serde_json::from_slice(body).map_err(AnalysisError::InvalidBody)
    }

    /// Check the URL before anything touches the network.
    pub fn validate(&self) -> Result<Url, AnalysisError> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(AnalysisError::MissingUrl);
        }
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
            _ => Err(AnalysisError::InvalidUrl),
        }
    }
}

/// Ordered milestones of one run, mirrored to an optional subscriber.
struct ExecutionLog<'a> {
    entries: Vec<String>,
    subscriber: Option<&'a UnboundedSender<Progress>>,
}

impl<'a> ExecutionLog<'a> {
    fn new(subscriber: Option<&'a UnboundedSender<Progress>>) -> Self {
        Self {
            entries: Vec::new(),
            subscriber,
        }
    }

    fn record(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        debug!(?stage, %message, "Milestone");
        if let Some(tx) = self.subscriber {
            // A gone subscriber only stops live updates.
            let _ = tx.send(Progress {
                stage,
                message: message.clone(),
            });
        }
        self.entries.push(message);
    }
}

/// Runs analyses against an injected fetcher and model client.
#[derive(Clone)]
pub struct Analyzer {
    fetcher: Arc<dyn FetchAsync>,
    model: Arc<dyn AskAsync>,
}

impl Analyzer {
    /// Wire the pipeline to its page fetcher and model client.
    pub fn new(fetcher: Arc<dyn FetchAsync>, model: Arc<dyn AskAsync>) -> Self {
        Self { fetcher, model }
    }

    pub fn model_client(&self) -> &Arc<dyn AskAsync> {
        &self.model
    }

    /// Analyze one article, returning the verdict or the fatal error.
    ///
    /// Validates the request, fetches the page unless content was supplied,
    /// asks the model once and extracts the verdict from its reply.
    ///
    /// # Arguments
    /// * `request` - The article URL and optional pre-extracted content.
    /// * `progress` - Optional subscriber; receives every execution log entry
    ///   as it is recorded, in order.
    ///
    /// # Returns
    /// The full [`AnalysisResult`]. A fetch failure or an unparseable reply
    /// still yields `Ok`; only validation and provider failures are `Err`.
    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        progress: Option<&UnboundedSender<Progress>>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let url = request.validate()?;
        let mut log = ExecutionLog::new(progress);

        let content = match request.supplied_content() {
            Some(text) => {
                log.record(
                    Stage::FetchSkipped,
                    format!("Using provided article content ({} chars)", text.chars().count()),
                );
                text.to_string()
            }
            None => {
                log.record(Stage::FetchStarted, format!("Fetching article content from {url}"));
                match self.fetcher.fetch(url.as_str()).await {
                    Fetched::Content(text) => {
                        log.record(
                            Stage::FetchDone,
                            format!("Fetched article content ({} chars)", text.chars().count()),
                        );
                        text
                    }
                    failed @ Fetched::Unavailable { .. } => {
                        log.record(
                            Stage::FetchFailed,
                            "Could not fetch article; continuing with placeholder text",
                        );
                        failed.into_text()
                    }
                }
            }
        };

        let prompt = build_prompt(&request.url, &content);
        log.record(
            Stage::ModelInvoked,
            format!("Querying {} for a credibility assessment", self.model.model()),
        );
        let raw = self.model.ask(&prompt).await.map_err(|e| {
            error!(error = %e, "Model call failed; aborting analysis");
            e
        })?;
        debug!(reply_preview = %truncate_for_log(&raw, 300), "Model replied");

        log.record(Stage::Parsing, "Parsing model response");
        let analysis = extract(&raw);

        log.record(
            Stage::VerdictReady,
            format!(
                "Verdict ready: {} (fake score {})",
                analysis.verdict.as_str(),
                analysis.fake_score
            ),
        );
        info!(
            verdict = analysis.verdict.as_str(),
            fake_score = analysis.fake_score,
            claims = analysis.claims.len(),
            "Analysis complete"
        );

        Ok(AnalysisResult {
            url: request.url,
            fake_score: analysis.fake_score,
            verdict: analysis.verdict,
            claims: analysis.claims,
            summary: analysis.summary,
            proof_sources: analysis.proof_sources,
            execution_log: log.entries,
            timestamp: iso_timestamp(),
        })
    }

    /// Like [`Analyzer::analyze`], abandoned after `limit`.
    pub async fn analyze_within(
        &self,
        request: AnalysisRequest,
        progress: Option<&UnboundedSender<Progress>>,
        limit: Duration,
    ) -> Result<AnalysisResult, AnalysisError> {
        match tokio::time::timeout(limit, self.analyze(request, progress)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(limit_ms = limit.as_millis() as u64, "Analysis exceeded the request timeout");
                Err(AnalysisError::TimedOut)
            }
        }
    }

    /// Run one request to completion and wrap the outcome in the envelope.
    pub async fn run(
        &self,
        request: AnalysisRequest,
        progress: Option<&UnboundedSender<Progress>>,
        limit: Duration,
    ) -> AnalysisResponse {
        match self.analyze_within(request, progress, limit).await {
            Ok(result) => AnalysisResponse::ok(result),
            Err(e) => e.to_response(),
        }
    }
}
