//! Configuration for kita-ingest
//!
//! Resolution order: CLI → environment → TOML → built-in defaults.
//! Missing TOML is not an error; every field has a default.

use kita_common::config::{load_toml_config, LoggingConfig};
use kita_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Service name used for config file discovery (`kita-ingest.toml`)
pub const SERVICE_NAME: &str = "kita-ingest";

pub const ENV_BIND_ADDRESS: &str = "KITA_BIND_ADDRESS";
pub const ENV_ANALYSIS_URL: &str = "KITA_ANALYSIS_URL";
pub const ENV_API_TOKEN: &str = "KITA_API_TOKEN";

/// Top-level TOML configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// HTTP listen address
    pub bind_address: String,

    /// Root folder holding kita.db (optional, see root folder resolution)
    pub root_folder: Option<PathBuf>,

    /// Bearer token required on `/api/v1/*`; `None` disables the check
    pub api_token: Option<String>,

    pub logging: LoggingConfig,
    pub upload: UploadConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
}

/// Upload validation limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum size of the audio part in bytes
    pub max_bytes: usize,

    /// Accepted media types (parameters such as `;codecs=` are ignored)
    pub allowed_content_types: Vec<String>,
}

/// External analysis capability
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL; requests go to `{base_url}/analyze`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Background pipeline behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrently running pipelines (0 = unbounded)
    pub max_in_flight: usize,

    /// Reject uploads with 503 when the process row cannot be created
    pub require_tracking: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Upper bound for retrying `database is locked` errors
    pub max_lock_wait_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5740".to_string(),
            root_folder: None,
            api_token: None,
            logging: LoggingConfig::default(),
            upload: UploadConfig::default(),
            analysis: AnalysisConfig::default(),
            pipeline: PipelineConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 25 * 1024 * 1024,
            allowed_content_types: [
                "audio/mpeg",
                "audio/mp4",
                "audio/x-m4a",
                "audio/wav",
                "audio/x-wav",
                "audio/webm",
                "audio/ogg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5741".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 0,
            require_tracking: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: 5000,
        }
    }
}

impl IngestConfig {
    /// Load TOML (if any), apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: IngestConfig = load_toml_config(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take priority over TOML values
    pub fn apply_env_overrides(&mut self) {
        if let Some(bind) = non_blank_env(ENV_BIND_ADDRESS) {
            info!("Bind address overridden by {}", ENV_BIND_ADDRESS);
            self.bind_address = bind;
        }
        if let Some(url) = non_blank_env(ENV_ANALYSIS_URL) {
            info!("Analysis URL overridden by {}", ENV_ANALYSIS_URL);
            self.analysis.base_url = url;
        }
        if let Some(token) = non_blank_env(ENV_API_TOKEN) {
            info!("API token loaded from {}", ENV_API_TOKEN);
            self.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload.max_bytes == 0 {
            return Err(Error::Config("upload.max_bytes must be greater than 0".to_string()));
        }
        if self
            .upload
            .allowed_content_types
            .iter()
            .all(|ct| ct.trim().is_empty())
        {
            return Err(Error::Config(
                "upload.allowed_content_types must list at least one media type".to_string(),
            ));
        }
        if self.analysis.base_url.trim().is_empty() {
            return Err(Error::Config("analysis.base_url must not be empty".to_string()));
        }
        if self.analysis.timeout_secs == 0 {
            return Err(Error::Config("analysis.timeout_secs must be greater than 0".to_string()));
        }
        if matches!(&self.api_token, Some(token) if token.trim().is_empty()) {
            return Err(Error::Config("api_token must not be blank when set".to_string()));
        }
        Ok(())
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
