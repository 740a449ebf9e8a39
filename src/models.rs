//! Data models for analysis requests, verdicts and the response envelope.
//!
//! This module defines the structures exchanged with callers and with the
//! language model:
//! - [`AnalysisRequest`]: the article URL (and optional pre-supplied text)
//! - [`AnalysisResult`]: the normalized verdict with claims and sources
//! - [`AnalysisResponse`]: the `{success, data | error}` envelope
//! - [`Progress`]: one milestone of the execution log
//!
//! Wire names are camelCase to match the JSON schema the model is asked to
//! produce and the shape the display layer consumes.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Input to a single analysis.
///
/// A missing `url` deserializes to an empty string so the orchestrator can
/// report "URL is required" instead of a body parse failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// The article to analyze.
    #[serde(default)]
    pub url: String,
    /// Article text supplied by the caller; skips the page fetch when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: None,
        }
    }

    /// Caller-supplied content, if any non-blank text was given.
    pub fn supplied_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

/// Categorical judgment of an article's truthfulness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    True,
    False,
    Mixed,
    #[default]
    Unverifiable,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::True,
        Verdict::False,
        Verdict::Mixed,
        Verdict::Unverifiable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::True => "TRUE",
            Verdict::False => "FALSE",
            Verdict::Mixed => "MIXED",
            Verdict::Unverifiable => "UNVERIFIABLE",
        }
    }

    /// Case- and whitespace-insensitive match against the wire spellings.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let wanted = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|v| v.as_str() == wanted)
    }
}

/// Verification status of a single claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Verified,
    False,
    #[default]
    Unverifiable,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 3] = [
        ClaimStatus::Verified,
        ClaimStatus::False,
        ClaimStatus::Unverifiable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Verified => "VERIFIED",
            ClaimStatus::False => "FALSE",
            ClaimStatus::Unverifiable => "UNVERIFIABLE",
        }
    }

    pub fn parse_loose(s: &str) -> Option<Self> {
        let wanted = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|v| v.as_str() == wanted)
    }
}

/// A factual assertion extracted from the article.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Claim {
    /// The claimed statement.
    pub text: String,
    /// Whether the model could verify it.
    pub status: ClaimStatus,
    /// The model's explanation.
    pub evidence: String,
}

/// An external reference cited as evidence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProofSource {
    pub title: String,
    pub url: String,
    /// Relevance in `[0, 100]`.
    pub relevance: f64,
}

/// The complete verdict returned to callers.
///
/// Every field is always populated; the extractor substitutes defaults for
/// anything the model omitted or corrupted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub url: String,
    /// Misinformation likelihood in `[0, 100]`.
    pub fake_score: f64,
    pub verdict: Verdict,
    pub claims: Vec<Claim>,
    pub summary: String,
    pub proof_sources: Vec<ProofSource>,
    /// Ordered milestone messages recorded while the analysis ran.
    pub execution_log: Vec<String>,
    /// ISO-8601 UTC completion time.
    pub timestamp: String,
}

/// Current UTC time in the `2025-05-06T14:30:00.123Z` form.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The `{success, data | error}` envelope returned by every entry point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResponse {
    pub fn ok(result: AnalysisResult) -> Self {
        Self {
            success: true,
            data: Some(result),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Pipeline milestones, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    FetchStarted,
    FetchDone,
    FetchFailed,
    FetchSkipped,
    ModelInvoked,
    Parsing,
    VerdictReady,
}

/// One entry of the execution log, as streamed to subscribers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Progress {
    pub stage: Stage,
    pub message: String,
}
