//! Analysis capability client
//!
//! The speech/categorization service is a black box: it receives the raw
//! audio and answers with one summary per recognized child.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::models::{AnalysisResult, Tracking};

const USER_AGENT: &str = concat!("kita-ingest/", env!("CARGO_PKG_VERSION"));

/// Correlation header carrying the process id
pub const PROCESS_ID_HEADER: &str = "X-Process-Id";

/// File name on the audio part when the uploader sent none
const DEFAULT_FILE_NAME: &str = "audio";

/// Analysis invocation errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Analysis service error {0}: {1}")]
    Api(u16, String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Analysis reported {count} results but returned {entries}")]
    Inconsistent { count: usize, entries: usize },
}

/// Input for one analysis call
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub audio: Vec<u8>,
    pub content_type: String,
    /// Client-supplied file name, forwarded on the audio part
    pub file_name: Option<String>,
    pub tracking: Tracking,
}

/// Seam between the orchestrator and the analysis capability
#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// HTTP adapter: `POST {base_url}/analyze` with a multipart `audio` part
pub struct HttpAudioAnalyzer {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpAudioAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/analyze", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AudioAnalyzer for HttpAudioAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let bytes = request.audio.len();
        let file_name = request
            .file_name
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        let part = Part::bytes(request.audio)
            .file_name(file_name)
            .mime_str(&request.content_type)
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        let form = Form::new().part("audio", part);

        let mut builder = self.http_client.post(&self.endpoint).multipart(form);
        if let Some(process_id) = request.tracking.id() {
            builder = builder.header(PROCESS_ID_HEADER, process_id.to_string());
        }

        tracing::debug!(
            process_id = %request.tracking,
            bytes,
            endpoint = %self.endpoint,
            "Calling analysis service"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(status.as_u16(), error_text));
        }

        let result: AnalysisResult = response
            .json()
            .await
            .map_err(|e| AnalysisError::Decode(e.to_string()))?;

        tracing::info!(
            process_id = %request.tracking,
            count = result.count,
            entries = result.results.len(),
            "Analysis returned"
        );

        Ok(result)
    }
}
