//! Command-line interface definitions for Awful Fact Check.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Provider settings can be passed as flags or environment variables and
//! override values read from `--config`.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Awful Fact Check application.
///
/// # Examples
///
/// ```sh
/// # Serve the HTTP API on the default address
/// GEMINI_API_KEY=... awful_fact_check serve
///
/// # Analyze one article and print the JSON envelope
/// awful_fact_check analyze https://example.com/story --pretty
///
/// # List the models visible to the configured key
/// awful_fact_check models
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier, e.g. gemini-2.5-flash
    #[arg(long, env = "GEMINI_MODEL", global = true)]
    pub model: Option<String>,

    /// Base URL of the Generative Language API
    #[arg(long, env = "GEMINI_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// Seconds to wait for the article page before using placeholder text
    #[arg(long, global = true)]
    pub fetch_timeout_secs: Option<u64>,

    /// Seconds before a whole analysis is abandoned
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Maximum characters of article text sent to the model
    #[arg(long, global = true)]
    pub max_content_chars: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "FACT_CHECK_BIND")]
        bind: Option<String>,

        /// Origin allowed to call the API from a browser
        #[arg(long, env = "FACT_CHECK_ALLOW_ORIGIN")]
        allow_origin: Option<String>,
    },
    /// Analyze a single article and print the result envelope
    Analyze {
        /// Article URL
        url: String,

        /// Article text to use instead of fetching the page
        #[arg(long)]
        content: Option<String>,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// List models available to the configured API key
    Models,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_analyze() {
        let cli = Cli::parse_from([
            "awful_fact_check",
            "analyze",
            "https://example.com/story",
            "--content",
            "Some article text",
            "-p",
        ]);

        match cli.command {
            Command::Analyze {
                url,
                content,
                pretty,
            } => {
                assert_eq!(url, "https://example.com/story");
                assert_eq!(content.as_deref(), Some("Some article text"));
                assert!(pretty);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "awful_fact_check",
            "serve",
            "-b",
            "0.0.0.0:8080",
            "--fetch-timeout-secs",
            "5",
            "--model",
            "gemini-2.0-flash",
        ]);

        assert_eq!(cli.fetch_timeout_secs, Some(5));
        assert_eq!(cli.model.as_deref(), Some("gemini-2.0-flash"));
        match cli.command {
            Command::Serve { bind, .. } => assert_eq!(bind.as_deref(), Some("0.0.0.0:8080")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["awful_fact_check"]).is_err());
    }

    #[test]
    fn test_cli_analyze_requires_url() {
        assert!(Cli::try_parse_from(["awful_fact_check", "analyze"]).is_err());
    }
}
