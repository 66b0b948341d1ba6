//! Runtime configuration from flags and environment variables.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mta-models", version, about = "Serve precomputed model artifacts over HTTP")]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 10000)]
    pub port: u16,

    /// Directory holding `*.model.json` artifacts and reference datasets.
    #[arg(long, env = "MODEL_ARTIFACTS_DIR", default_value = "model_artifacts")]
    pub artifacts_dir: PathBuf,

    /// Comma-separated CORS origins. Empty allows any origin.
    #[arg(long, env = "ALLOW_ORIGINS", default_value = "")]
    pub allow_origins: String,

    /// Upper bound for a single inference, including the wait for a worker slot.
    #[arg(long, env = "INFERENCE_TIMEOUT_MS", default_value_t = 2000)]
    pub inference_timeout_ms: u64,

    #[arg(long, env = "MAX_CONCURRENT_INFERENCES", default_value_t = 64)]
    pub max_concurrent_inferences: usize,

    /// Model scored by `/risk/score`.
    #[arg(long, env = "RISK_MODEL", default_value = "xgb_risk")]
    pub risk_model: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// Parsed CORS origins; `None` means any origin.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .allow_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() { None } else { Some(origins) }
    }

    /// Defaults pointed at a specific artifact directory.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 10000,
            artifacts_dir: dir.into(),
            allow_origins: String::new(),
            inference_timeout_ms: 2000,
            max_concurrent_inferences: 64,
            risk_model: "xgb_risk".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
