//! Text-to-speech HTTP adapter.
//!
//! Posts `{text, voice, speed}` to an external speech engine and gets raw
//! audio bytes back. Kept behind the [`Synthesizer`] trait so the fan-out
//! can be driven by a mock engine in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::SynthesisError;
use crate::config::TtsConfig;

/// A speech synthesis engine.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one unit of text into audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice: &'a str,
    speed: &'a str,
}

/// HTTP client for the external speech engine.
pub struct TtsClient {
    enabled: bool,
    endpoint: String,
    voice: String,
    speed: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl TtsClient {
    /// Create a client from configuration.
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            enabled: config.enabled,
            endpoint: config.endpoint.clone(),
            voice: config.voice.clone(),
            speed: config.speed.clone(),
            timeout_secs: config.timeout_secs,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Whether synthesis is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Synthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        if !self.enabled {
            return Err(SynthesisError::Disabled);
        }

        tracing::debug!(chars = text.chars().count(), "synthesizing speech unit");

        let body = SynthesizeBody {
            text,
            voice: &self.voice,
            speed: &self.speed,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout(self.timeout_secs)
                } else {
                    SynthesisError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Engine(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Engine(format!("truncated audio body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

// ── Tests ────────────────────────────────────────────────────────
