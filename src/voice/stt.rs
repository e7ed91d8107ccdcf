//! Speech-to-text HTTP adapter.
//!
//! Uploads captured audio as a multipart WAV file and returns the
//! transcription. Reserved for the `listening` voice-capture path; the
//! text pipeline never calls it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SttConfig;

/// Transcription failure kinds.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// Transcription is disabled in configuration.
    #[error("STT is not enabled; enable it in the [voice.stt] config section")]
    Disabled,

    /// Could not reach the speech engine.
    #[error("speech engine unreachable: {0}")]
    Unreachable(String),

    /// The transcription request exceeded its deadline.
    #[error("transcription timed out after {0}s")]
    Timeout(u64),

    /// The engine answered with an error status or an undecodable body.
    #[error("speech engine error: {0}")]
    Engine(String),
}

/// A speech transcription engine.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio bytes into text.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// HTTP client for the external transcription engine.
pub struct SttClient {
    enabled: bool,
    endpoint: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl SttClient {
    /// Create a client from configuration.
    pub fn from_config(config: &SttConfig) -> Self {
        Self {
            enabled: config.enabled,
            endpoint: config.endpoint.clone(),
            timeout_secs: config.timeout_secs,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Whether transcription is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Transcriber for SttClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError> {
        if !self.enabled {
            return Err(TranscriptionError::Disabled);
        }

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Engine(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Timeout(self.timeout_secs)
                } else {
                    TranscriptionError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptionError::Engine(format!("HTTP {status}")));
        }

        let decoded: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Engine(format!("undecodable response: {e}")))?;
        Ok(decoded.text)
    }
}

// ── Tests ────────────────────────────────────────────────────────
