//! The instruction sent to the model for each article.
//!
//! Enum spellings are rendered from [`Verdict::ALL`] and [`ClaimStatus::ALL`]
//! so the schema the model sees is the one the extractor accepts.

use crate::models::{ClaimStatus, Verdict};
use itertools::Itertools;

/// Render the analysis prompt for `url` and its extracted `content`.
///
/// # Arguments
/// * `url` - The article URL, quoted verbatim in the prompt.
/// * `content` - Article text, or the fetch placeholder.
///
/// # Returns
/// The prompt asking for a single JSON object with the exact verdict and
/// claim status spellings the extractor accepts.
pub fn build_prompt(url: &str, content: &str) -> String {
    let verdicts = Verdict::ALL.iter().map(Verdict::as_str).join("|");
    let statuses = ClaimStatus::ALL.iter().map(ClaimStatus::as_str).join("|");

    format!(
        r#"Analyze this news article for potential fake news and misinformation:
URL: {url}
Content: {content}

Provide a JSON response with this exact structure:
{{
  "fakeScore": <number 0-100>,
  "verdict": "<{verdicts}>",
  "summary": "<brief summary of findings>",
  "claims": [
    {{
      "text": "<claimed statement>",
      "status": "<{statuses}>",
      "evidence": "<explanation>"
    }}
  ],
  "proofSources": [
    {{
      "title": "<source title>",
      "url": "<source url>",
      "relevance": <0-100>
    }}
  ]
}}
Be thorough and analytical. This is for fake news detection."#
    )
}
