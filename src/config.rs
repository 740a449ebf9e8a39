//! Runtime settings: built-in defaults, an optional YAML file, then CLI/env overrides.
//!
//! ```yaml
//! # fact_check.yaml
//! model: gemini-2.5-flash
//! fetch_timeout_secs: 20
//! request_timeout_secs: 30
//! max_content_chars: 3000
//! bind: 127.0.0.1:3000
//! ```

use crate::cli::{Cli, Command};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(
        "request timeout ({request}s) must be longer than the fetch timeout ({fetch}s)"
    )]
    Timeouts { request: u64, fetch: u64 },
    #[error("max_content_chars must be greater than zero")]
    EmptyContentBudget,
}

/// Everything the pipeline and the server need to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Gemini API key. Usually supplied via `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub fetch_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_content_chars: usize,
    pub user_agent: String,
    pub bind: String,
    /// Origin allowed by CORS; no CORS layer when unset.
    pub allow_origin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            fetch_timeout_secs: 20,
            request_timeout_secs: 30,
            max_content_chars: 3000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            bind: "127.0.0.1:3000".to_string(),
            allow_origin: None,
        }
    }
}

impl Settings {
    /// Parse settings from YAML; absent keys keep their defaults.
    pub fn from_yaml(path: &str, yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Load from a YAML file, or defaults when no path is given.
    #[instrument(level = "debug")]
    pub async fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
        let settings = Self::from_yaml(path, &yaml)?;
        debug!(path, "Loaded settings file");
        Ok(settings)
    }

    /// Apply explicit CLI flags and environment variables on top.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(key) = cli.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(model) = &cli.model {
            self.model = model.clone();
        }
        if let Some(base) = &cli.api_base {
            self.api_base = base.clone();
        }
        if let Some(secs) = cli.fetch_timeout_secs {
            self.fetch_timeout_secs = secs;
        }
        if let Some(secs) = cli.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(chars) = cli.max_content_chars {
            self.max_content_chars = chars;
        }
        if let Command::Serve { bind, allow_origin } = &cli.command {
            if let Some(bind) = bind {
                self.bind = bind.clone();
            }
            if let Some(origin) = allow_origin {
                self.allow_origin = Some(origin.clone());
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs <= self.fetch_timeout_secs {
            return Err(ConfigError::Timeouts {
                request: self.request_timeout_secs,
                fetch: self.fetch_timeout_secs,
            });
        }
        if self.max_content_chars == 0 {
            return Err(ConfigError::EmptyContentBudget);
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolve the effective settings for this process.
pub async fn resolve(cli: &Cli) -> Result<Settings, ConfigError> {
    let settings = Settings::load(cli.config.as_deref()).await?.apply_cli(cli);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        assert_eq!(s.model, "gemini-2.5-flash");
        assert_eq!(s.fetch_timeout(), Duration::from_secs(20));
        assert_eq!(s.request_timeout(), Duration::from_secs(30));
        assert_eq!(s.max_content_chars, 3000);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let s = Settings::from_yaml("inline", "model: gemini-2.0-flash\nmax_content_chars: 500\n")
            .unwrap();
        assert_eq!(s.model, "gemini-2.0-flash");
        assert_eq!(s.max_content_chars, 500);
        assert_eq!(s.fetch_timeout_secs, 20);
        assert_eq!(s.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_bad_yaml_reports_path() {
        let err = Settings::from_yaml("conf.yaml", "fetch_timeout_secs: [1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("conf.yaml"));
    }

    #[test]
    fn test_request_timeout_must_exceed_fetch_timeout() {
        let s = Settings {
            fetch_timeout_secs: 30,
            request_timeout_secs: 30,
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Timeouts {
                request: 30,
                fetch: 30
            })
        ));
    }

    #[test]
    fn test_zero_content_budget_rejected() {
        let s = Settings {
            max_content_chars: 0,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::EmptyContentBudget)));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let file = Settings::from_yaml("inline", "model: from-file\nfetch_timeout_secs: 5\n")
            .unwrap();
        let cli = Cli::parse_from([
            "awful_fact_check",
            "--model",
            "from-cli",
            "--api-key",
            " secret ",
            "models",
        ]);
        let s = file.apply_cli(&cli);
        assert_eq!(s.model, "from-cli");
        assert_eq!(s.fetch_timeout_secs, 5);
        assert_eq!(s.api_key.as_deref(), Some("secret"));
        assert!(s.has_api_key());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Settings::load(Some("/nonexistent/fact_check.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn test_load_without_path_uses_defaults() {
        let s = Settings::load(None).await.unwrap();
        assert_eq!(s.bind, "127.0.0.1:3000");
    }
}
