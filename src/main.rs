//! # Awful Fact Check
//!
//! Submit a news article URL and get back a Gemini-generated credibility
//! verdict: a 0-100 fake score, a verdict label, a claim-by-claim breakdown
//! and the sources the model cites.
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... awful_fact_check serve --bind 127.0.0.1:3000
//! awful_fact_check analyze https://example.com/story --pretty
//! ```
//!
//! ## Architecture
//!
//! Each analysis runs a short sequential pipeline:
//! 1. **Fetching**: Download the article page and strip it to plain text
//! 2. **Prompting**: Render the fixed JSON-schema instruction
//! 3. **Querying**: One call to the Gemini `generateContent` endpoint
//! 4. **Extracting**: Pull the JSON object out of the reply and normalize it
//!
//! Fetch and parse problems degrade the result; only a failed model call
//! fails the request.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod extract;
mod fetcher;
mod models;
mod pipeline;
mod prompt;
mod server;
mod utils;

use api::{AskAsync, GeminiClient};
use cli::{Cli, Command};
use fetcher::HttpFetcher;
use models::{AnalysisRequest, AnalysisResponse, Progress};
use pipeline::Analyzer;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args.config, ?args.model, "Parsed CLI arguments");

    let settings = config::resolve(&args).await?;
    if !settings.has_api_key() {
        error!("GEMINI_API_KEY is not set; model calls will fail until it is configured");
    }
    info!(model = %settings.model, "awful_fact_check starting up");

    let gemini = Arc::new(GeminiClient::new(&settings)?);
    let fetcher = Arc::new(HttpFetcher::new(&settings)?);

    match args.command {
        Command::Serve { .. } => {
            let analyzer = Analyzer::new(fetcher, gemini);
            server::serve(analyzer, &settings).await?;
        }
        Command::Analyze {
            url,
            content,
            pretty,
        } => {
            let analyzer = Analyzer::new(fetcher, gemini);
            let request = AnalysisRequest {
                content,
                ..AnalysisRequest::new(url)
            };
            let start_time = std::time::Instant::now();
            let (response, _) = analyze_once(
                &analyzer,
                request,
                settings.request_timeout(),
                std::io::stderr(),
            )
            .await?;
            println!("{}", render_envelope(&response, pretty)?);

            let elapsed = start_time.elapsed();
            info!(?elapsed, success = response.success, "Execution complete");
            exit_status(&response)?;
        }
        Command::Models => {
            let models = gemini.list_models().await?;
            println!("{}", serde_json::to_string_pretty(&models)?);
        }
    }

    Ok(())
}

/// Run one analysis, writing a timestamped line to `log_sink` per progress
/// event as it happens.
///
/// # Arguments
/// * `analyzer` - The wired pipeline.
/// * `request` - The article to analyze.
/// * `limit` - Outer timeout for the whole analysis.
/// * `log_sink` - Where progress lines go; stderr for the CLI.
///
/// # Returns
/// The response envelope and the sink, once every progress line is written.
async fn analyze_once<W>(
    analyzer: &Analyzer,
    request: AnalysisRequest,
    limit: Duration,
    mut log_sink: W,
) -> Result<(AnalysisResponse, W), JoinError>
where
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();

    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            // A closed terminal should not fail the analysis.
            let _ = writeln!(log_sink, "[{}] {}", Local::now().format("%H:%M:%S"), p.message);
        }
        log_sink
    });

    let response = analyzer.run(request, Some(&tx), limit).await;
    drop(tx);
    Ok((response, printer.await?))
}

/// Serialize the envelope for stdout.
fn render_envelope(response: &AnalysisResponse, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(response)
    } else {
        serde_json::to_string(response)
    }
}

/// A failed envelope becomes the process error, so the exit status is non-zero.
fn exit_status(response: &AnalysisResponse) -> Result<(), String> {
    match &response.error {
        Some(message) => Err(message.clone()),
        None => Ok(()),
    }
}
