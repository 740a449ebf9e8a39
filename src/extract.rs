//! Tolerant extraction of the verdict JSON from a free-text model reply.
//!
//! Models wrap their JSON in prose or code fences, omit fields, and invent
//! enum spellings. Extraction is total: it never errors and always yields a
//! fully populated [`ExtractedAnalysis`].
//!
//! 1. Take the span from the first `{` to the last `}`.
//! 2. Parse it. No span or invalid JSON → [`ExtractedAnalysis::unparsed`].
//! 3. Read each field independently, substituting its default when missing
//!    or malformed.
//!
//! Normalization rules:
//! - `fakeScore`: number or numeric string, clamped to `[0, 100]`, else 50
//! - `verdict` / claim `status`: case-insensitive, unknown → `UNVERIFIABLE`
//! - `summary`: empty or non-string → "Analysis completed"
//! - claims without text and non-object entries are dropped; duplicate claims
//!   (by text) and sources (by url) keep the first occurrence

use crate::models::{Claim, ClaimStatus, ProofSource, Verdict};
use crate::utils::{clamp_percent, truncate_for_log};
use itertools::Itertools;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const DEFAULT_FAKE_SCORE: f64 = 50.0;
pub const DEFAULT_SUMMARY: &str = "Analysis completed";
pub const UNPARSED_SUMMARY: &str = "Could not parse analysis response";

/// The model-derived part of an [`AnalysisResult`](crate::models::AnalysisResult).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAnalysis {
    pub fake_score: f64,
    pub verdict: Verdict,
    pub summary: String,
    pub claims: Vec<Claim>,
    pub proof_sources: Vec<ProofSource>,
}

impl ExtractedAnalysis {
    /// Canonical result for a reply with no usable JSON.
    pub fn unparsed() -> Self {
        Self {
            fake_score: DEFAULT_FAKE_SCORE,
            verdict: Verdict::Unverifiable,
            summary: UNPARSED_SUMMARY.to_string(),
            claims: Vec::new(),
            proof_sources: Vec::new(),
        }
    }
}

/// The greedy outermost `{ … }` span of `raw`, if any.
pub fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Extract a normalized analysis from a raw model reply.
pub fn extract(raw: &str) -> ExtractedAnalysis {
    let Some(span) = json_span(raw) else {
        warn!(
            reply_preview = %truncate_for_log(raw, 300),
            "Model reply contains no JSON object; using fallback analysis"
        );
        return ExtractedAnalysis::unparsed();
    };

    // The span starts with `{` and ends with `}`, so anything that parses is an object.
    let obj = match serde_json::from_str::<Map<String, Value>>(span) {
        Ok(obj) => obj,
        Err(e) => {
            warn!(
                error = %e,
                span_preview = %truncate_for_log(span, 300),
                "Model reply JSON did not parse; using fallback analysis"
            );
            return ExtractedAnalysis::unparsed();
        }
    };

    let analysis = ExtractedAnalysis {
        fake_score: obj
            .get("fakeScore")
            .and_then(percent)
            .unwrap_or(DEFAULT_FAKE_SCORE),
        verdict: obj
            .get("verdict")
            .and_then(Value::as_str)
            .and_then(Verdict::parse_loose)
            .unwrap_or_default(),
        summary: non_empty_str(&obj, "summary")
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string(),
        claims: claims(obj.get("claims")),
        proof_sources: proof_sources(obj.get("proofSources")),
    };
    debug!(
        fake_score = analysis.fake_score,
        verdict = analysis.verdict.as_str(),
        claims = analysis.claims.len(),
        proof_sources = analysis.proof_sources.len(),
        "Extracted analysis"
    );
    analysis
}

/// A number, or a string holding one, clamped to `[0, 100]`.
fn percent(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    clamp_percent(n)
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn string_or_empty(obj: &Map<String, Value>, key: &str) -> String {
    non_empty_str(obj, key).unwrap_or_default().to_string()
}

fn objects(v: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    v.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn claims(v: Option<&Value>) -> Vec<Claim> {
    objects(v)
        .filter_map(|c| {
            let text = non_empty_str(c, "text")?.to_string();
            Some(Claim {
                text,
                status: c
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(ClaimStatus::parse_loose)
                    .unwrap_or_default(),
                evidence: string_or_empty(c, "evidence"),
            })
        })
        .unique_by(|c| c.text.clone())
        .collect()
}

fn proof_sources(v: Option<&Value>) -> Vec<ProofSource> {
    objects(v)
        .map(|s| ProofSource {
            title: string_or_empty(s, "title"),
            url: string_or_empty(s, "url"),
            relevance: s.get("relevance").and_then(percent).unwrap_or(0.0),
        })
        .filter(|s| !(s.title.is_empty() && s.url.is_empty()))
        .unique_by(|s| {
            if s.url.is_empty() {
                s.title.clone()
            } else {
                s.url.clone()
            }
        })
        .collect()
}
