//! Article page fetching and markup stripping.
//!
//! The fetcher never fails the pipeline. A timeout, transport error or
//! unreadable body yields [`Fetched::Unavailable`], which downstream stages
//! turn into [`FETCH_PLACEHOLDER`] and carry on with degraded input.
//!
//! # Sanitizing
//!
//! 1. Drop `<script>`, `<style>`, `<noscript>` blocks and HTML comments
//! 2. Replace every remaining tag with a space
//! 3. Decode HTML entities, named and numeric
//! 4. Collapse whitespace runs and truncate to the character budget
//!
//! At most [`MAX_BODY_BYTES`] of a page are read; the rest of the response
//! is dropped unread.

use crate::config::Settings;
use crate::utils::truncate_chars;
use async_trait::async_trait;
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Text handed to the model when the article could not be retrieved.
pub const FETCH_PLACEHOLDER: &str =
    "Could not fetch URL. Using provided content or default analysis.";

/// Upper bound on the bytes read from one article page.
pub const MAX_BODY_BYTES: usize = 512 * 1024;

static NON_CONTENT_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>|<!--.*?-->")
        .expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Outcome of a page fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Sanitized, truncated page text.
    Content(String),
    /// The page could not be retrieved; `reason` is for logs only.
    Unavailable { reason: String },
}

impl Fetched {
    /// The text to analyze, substituting the placeholder on failure.
    pub fn into_text(self) -> String {
        match self {
            Fetched::Content(text) => text,
            Fetched::Unavailable { .. } => FETCH_PLACEHOLDER.to_string(),
        }
    }
}

/// Something that can turn a URL into article text.
#[async_trait]
pub trait FetchAsync: Send + Sync {
    async fn fetch(&self, url: &str) -> Fetched;
}

/// Fetches pages over HTTP with a browser user-agent and a bounded wait.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_chars: usize,
}

impl HttpFetcher {
    /// Create a fetcher from resolved settings.
    ///
    /// # Arguments
    /// * `settings` - Supplies the user-agent, the per-fetch timeout (which
    ///   covers reading the body) and the character budget for the text.
    ///
    /// # Returns
    /// The fetcher, or the `reqwest` error if the client could not be built.
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.fetch_timeout())
            .build()?;
        Ok(Self {
            client,
            max_chars: settings.max_content_chars,
        })
    }

    async fn fetch_body(&self, url: &str) -> Result<String, reqwest::Error> {
        let mut resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%url, %status, "Article page returned a non-success status; using body anyway");
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = MAX_BODY_BYTES - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                info!(%url, limit = MAX_BODY_BYTES, "Article page exceeds the read budget; truncating");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl FetchAsync for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Fetched {
        let t0 = Instant::now();
        match self.fetch_body(url).await {
            Ok(html) => {
                let text = sanitize_html(&html, self.max_chars);
                info!(
                    bytes = html.len(),
                    chars = text.chars().count(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched article page"
                );
                Fetched::Content(text)
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    error = %reason,
                    "Could not fetch article page"
                );
                Fetched::Unavailable { reason }
            }
        }
    }
}

/// Strip markup from `html` and bound the result to `max_chars` characters.
pub fn sanitize_html(html: &str, max_chars: usize) -> String {
    let without_blocks = NON_CONTENT_BLOCKS.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, " ");
    let decoded = decode_html_entities(&without_tags);
    let collapsed = WHITESPACE.replace_all(&decoded, " ");
    truncate_chars(collapsed.trim(), max_chars).to_string()
}
