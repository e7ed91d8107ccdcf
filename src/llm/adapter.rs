//! Generic HTTP generation backend adapter.
//!
//! Works with Ollama, llama.cpp server, and other compatible completion
//! endpoints: one POST per request, and priority-ordered decoding across
//! the response shapes those backends actually return. Failures come back
//! as structured [`GenerationError`] kinds so callers can distinguish
//! "backend unreachable" from everything else without inspecting message
//! text.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// One generation request, fully resolved (no ambient configuration).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Backend model identifier (e.g. `phi3:mini`).
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stop: Vec<String>,
}

/// Generation failure kinds.
///
/// `Unreachable` and `Timeout` are connectivity failures the pipeline
/// recovers from locally; everything else surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Network-level failure reaching the backend (connection refused,
    /// DNS, broken transport).
    #[error("generation backend unreachable: {0}")]
    Unreachable(String),

    /// The request exceeded the configured deadline. Aborts only the
    /// in-flight request.
    #[error("generation request timed out after {0}s")]
    Timeout(u64),

    /// The backend answered, but with an error status or an undecodable
    /// body.
    #[error("generation backend error: {0}")]
    Backend(String),
}

impl GenerationError {
    /// Whether this failure means the backend is unavailable (recovered
    /// via the offline fallback) rather than a surfaced error.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

/// A text-generation backend. Stateless request/response.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Completion request body sent to the backend.
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
    stop: &'a [String],
    stream: bool,
}

/// HTTP adapter for completion-style generation endpoints.
pub struct HttpGenerationAdapter {
    endpoint: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpGenerationAdapter {
    /// Create an adapter for `endpoint` with a per-request deadline.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout_secs,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout_secs)
        } else {
            GenerationError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationAdapter {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = CompletionBody {
            model: &request.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: &request.stop,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Backend(format!(
                "HTTP {status}: {}",
                status.canonical_reason().unwrap_or("unknown")
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Backend(format!("undecodable response body: {e}")))?;

        Ok(decode_completion(&value))
    }
}

/// Decode a completion from the known backend response shapes, in priority
/// order. Unrecognized shapes degrade to the raw serialization rather than
/// failing.
pub fn decode_completion(value: &Value) -> String {
    // Ollama format
    if let Some(text) = value.get("response").and_then(Value::as_str) {
        return text.to_string();
    }

    // llama.cpp format
    if let Some(text) = value.get("content").and_then(Value::as_str) {
        return text.to_string();
    }

    // OpenAI-compatible format
    if let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        return choice
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| {
                choice
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .to_string();
    }

    // Generic text field
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    tracing::warn!("unknown generation response shape, returning raw serialization");
    value.to_string()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "phi3:mini".into(),
            prompt: "Hello".into(),
            max_tokens: 500,
            temperature: 0.7,
            stop: Vec::new(),
        }
    }

    #[test]
    fn decode_ollama_shape() {
        assert_eq!(decode_completion(&json!({"response": "Hi!"})), "Hi!");
    }

    #[test]
    fn decode_llamacpp_shape() {
        assert_eq!(decode_completion(&json!({"content": "Hi!"})), "Hi!");
    }

    #[test]
    fn decode_openai_text_shape() {
        let value = json!({"choices": [{"text": "Hi!"}]});
        assert_eq!(decode_completion(&value), "Hi!");
    }

    #[test]
    fn decode_openai_chat_shape() {
        let value = json!({"choices": [{"message": {"content": "Hi!"}}]});
        assert_eq!(decode_completion(&value), "Hi!");
    }

    #[test]
    fn decode_generic_text_shape() {
        assert_eq!(decode_completion(&json!({"text": "Hi!"})), "Hi!");
    }

    #[test]
    fn decode_prefers_response_over_text() {
        let value = json!({"response": "first", "text": "second"});
        assert_eq!(decode_completion(&value), "first");
    }

    #[test]
    fn decode_empty_choice_degrades_to_empty() {
        let value = json!({"choices": [{"finish_reason": "stop"}]});
        assert_eq!(decode_completion(&value), "");
    }

    #[test]
    fn decode_unknown_shape_returns_raw() {
        let value = json!({"something": 42});
        let decoded = decode_completion(&value);
        assert!(decoded.contains("something"));
        assert!(decoded.contains("42"));
    }

    #[tokio::test]
    async fn generate_decodes_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi there!"})))
            .mount(&server)
            .await;

        let adapter = HttpGenerationAdapter::new(&format!("{}/api/generate", server.uri()), 30);
        let text = adapter.generate(&request()).await.unwrap();
        assert_eq!(text, "Hi there!");
    }

    #[tokio::test]
    async fn generate_maps_error_status_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = HttpGenerationAdapter::new(&server.uri(), 30);
        let err = adapter.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(_)));
        assert!(!err.is_offline());
    }

    #[tokio::test]
    async fn generate_maps_connection_refused_to_unreachable() {
        // Nothing listens on port 9 (discard); the connect fails fast.
        let adapter = HttpGenerationAdapter::new("http://127.0.0.1:9/api/generate", 30);
        let err = adapter.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unreachable(_)));
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn generate_times_out_and_reports_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let adapter = HttpGenerationAdapter::new(&server.uri(), 1);
        let err = adapter.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Timeout(1)));
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn generate_maps_non_json_body_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let adapter = HttpGenerationAdapter::new(&server.uri(), 30);
        let err = adapter.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(_)));
    }
}
