//! Upload validation
//!
//! Parses the multipart upload and rejects it before any state exists.
//! The audio part is read chunk by chunk so an oversize file is refused as
//! soon as it crosses the limit instead of after being fully buffered.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::config::UploadConfig;

pub const AUDIO_FIELD: &str = "audio";
pub const TEACHER_ID_FIELD: &str = "teacher_id";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Reasons an upload is refused (all map to HTTP 400)
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Audio file exceeds the maximum size of {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Missing 'audio' file part")]
    MissingFile,

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Content type '{0}' is not allowed")]
    DisallowedContentType(String),
}

/// Upload that passed every check; owned by the pipeline from here on
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub audio: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
    /// Operator id as sent; numeric parsing happens in the pipeline
    pub teacher_id: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_bytes: usize,
    allowed_content_types: Vec<String>,
}

struct AudioPart {
    bytes: Vec<u8>,
    content_type: String,
    file_name: Option<String>,
}

impl UploadValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|ct| normalize_content_type(ct))
                .filter(|ct| !ct.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive match on the bare media type
    pub fn is_allowed(&self, content_type: &str) -> bool {
        let normalized = normalize_content_type(content_type);
        self.allowed_content_types.iter().any(|ct| *ct == normalized)
    }

    /// Consume the multipart body
    pub async fn validate(&self, mut multipart: Multipart) -> Result<ValidatedUpload, UploadError> {
        let mut audio: Option<AudioPart> = None;
        let mut teacher_id: Option<String> = None;
        let mut timestamp: Option<String> = None;

        while let Some(field) = multipart.next_field().await.map_err(|e| self.map_multipart(e))? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                AUDIO_FIELD => {
                    if audio.is_some() {
                        return Err(UploadError::Malformed(format!(
                            "more than one '{}' part",
                            AUDIO_FIELD
                        )));
                    }
                    audio = Some(self.read_audio(field).await?);
                }
                TEACHER_ID_FIELD => {
                    teacher_id = Some(field.text().await.map_err(|e| self.map_multipart(e))?);
                }
                TIMESTAMP_FIELD => {
                    timestamp = Some(field.text().await.map_err(|e| self.map_multipart(e))?);
                }
                other => {
                    // next_field() drains the rest of this part
                    debug!(field = other, "Ignoring unknown upload field");
                }
            }
        }

        let audio = audio.ok_or(UploadError::MissingFile)?;

        let teacher_id = teacher_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                UploadError::Malformed(format!("'{}' is required", TEACHER_ID_FIELD))
            })?;

        let timestamp = timestamp.ok_or_else(|| {
            UploadError::Malformed(format!("'{}' is required", TIMESTAMP_FIELD))
        })?;
        let observed_at = parse_observed_at(&timestamp)?;

        debug!(
            bytes = audio.bytes.len(),
            content_type = %audio.content_type,
            file_name = ?audio.file_name,
            "Upload validated"
        );

        Ok(ValidatedUpload {
            audio: audio.bytes,
            content_type: audio.content_type,
            file_name: audio.file_name,
            teacher_id,
            observed_at,
        })
    }

    async fn read_audio(&self, mut field: Field<'_>) -> Result<AudioPart, UploadError> {
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !self.is_allowed(&content_type) {
            let shown = if content_type.is_empty() {
                "<none>".to_string()
            } else {
                content_type
            };
            return Err(UploadError::DisallowedContentType(shown));
        }
        let file_name = field.file_name().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| self.map_multipart(e))? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(UploadError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(UploadError::Malformed(format!("'{}' part is empty", AUDIO_FIELD)));
        }

        Ok(AudioPart {
            bytes,
            content_type,
            file_name,
        })
    }

    fn map_multipart(&self, err: MultipartError) -> UploadError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge {
                max_bytes: self.max_bytes,
            }
        } else {
            UploadError::Multipart(err.body_text())
        }
    }
}

/// Lowercased media type without parameters (`Audio/WebM; codecs=opus` -> `audio/webm`)
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Parse the RFC3339 observation timestamp
pub fn parse_observed_at(value: &str) -> Result<DateTime<Utc>, UploadError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            UploadError::Malformed(format!(
                "'{}' must be an RFC3339 timestamp: {}",
                TIMESTAMP_FIELD, e
            ))
        })
}
