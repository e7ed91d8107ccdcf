//! Language-model abstraction layer.
//!
//! [`ModelManager`] resolves model aliases (`default`, `code`) to backend
//! model names from configuration and forwards requests to a
//! [`GenerationBackend`]. Configuration is an explicit value passed in at
//! construction, never read from ambient process state, so the manager is
//! independently testable against a mock backend.

pub mod adapter;

use std::collections::HashMap;
use std::sync::Arc;

pub use adapter::{GenerationBackend, GenerationError, GenerationRequest, HttpGenerationAdapter};

use crate::config::{GenerationConfig, ModelSpec};
use crate::util::truncate_with_ellipsis;

/// First sentence of the offline fallback reply; stable so callers and
/// tests can detect the fallback path.
pub const OFFLINE_FALLBACK_PREFIX: &str = "I'm currently running in offline mode.";

/// How many characters of the user's text the offline fallback echoes.
const FALLBACK_ECHO_CHARS: usize = 100;

/// Deterministic reply used when the generation backend is unavailable.
/// Embeds a truncated echo of the user's text.
pub fn offline_fallback(user_text: &str) -> String {
    format!(
        "{OFFLINE_FALLBACK_PREFIX} The language model backend is not available. \
         Please check that your local model server is running at the configured \
         endpoint.\n\nYou asked: \"{}\"",
        truncate_with_ellipsis(user_text, FALLBACK_ECHO_CHARS)
    )
}

/// Per-call generation options chosen by the intent handler.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            stop: Vec::new(),
        }
    }
}

/// Resolves model aliases and drives the generation backend.
pub struct ModelManager {
    backend: Arc<dyn GenerationBackend>,
    models: HashMap<String, ModelSpec>,
}

impl ModelManager {
    /// Create a manager over an explicit backend and model table. Used by
    /// tests to substitute a mock backend.
    pub fn new(backend: Arc<dyn GenerationBackend>, models: HashMap<String, ModelSpec>) -> Self {
        Self { backend, models }
    }

    /// Create a manager from configuration, backed by the HTTP adapter.
    pub fn from_config(config: &GenerationConfig) -> Self {
        let backend = Arc::new(HttpGenerationAdapter::new(
            &config.endpoint,
            config.timeout_secs,
        ));
        Self::new(backend, config.models.clone())
    }

    /// Resolve a model alias, falling back to `default`.
    fn resolve(&self, alias: &str) -> Result<&ModelSpec, GenerationError> {
        self.models
            .get(alias)
            .or_else(|| self.models.get("default"))
            .ok_or_else(|| {
                GenerationError::Backend(format!("model '{alias}' not found in configuration"))
            })
    }

    /// Generate text with the model behind `alias`.
    ///
    /// Connectivity failures (`Unreachable`, `Timeout`) pass through for
    /// the caller to recover via [`offline_fallback`]; any other failure is
    /// a surfaced error.
    pub async fn generate(
        &self,
        alias: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let spec = self.resolve(alias)?;

        tracing::debug!(alias, model = %spec.name, max_tokens = options.max_tokens, "generating");

        let request = GenerationRequest {
            model: spec.name.clone(),
            prompt: prompt.to_string(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop.clone(),
        };
        self.backend.generate(&request).await
    }

    /// List configured model aliases with their specs.
    pub fn available_models(&self) -> Vec<(&str, &ModelSpec)> {
        let mut models: Vec<_> = self
            .models
            .iter()
            .map(|(alias, spec)| (alias.as_str(), spec))
            .collect();
        models.sort_by_key(|(alias, _)| *alias);
        models
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok(format!("{}:{}", request.model, request.max_tokens))
        }
    }

    fn models() -> HashMap<String, ModelSpec> {
        let mut models = HashMap::new();
        models.insert(
            "default".to_string(),
            ModelSpec {
                name: "phi3:mini".into(),
                description: "Default chat model".into(),
            },
        );
        models.insert(
            "code".to_string(),
            ModelSpec {
                name: "codellama:7b".into(),
                description: "Code generation model".into(),
            },
        );
        models
    }

    #[tokio::test]
    async fn resolves_alias_to_model_name() {
        let manager = ModelManager::new(Arc::new(EchoBackend), models());
        let out = manager
            .generate("code", "x", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "codellama:7b:500");
    }

    #[tokio::test]
    async fn unknown_alias_falls_back_to_default() {
        let manager = ModelManager::new(Arc::new(EchoBackend), models());
        let out = manager
            .generate("mystery", "x", &GenerationOptions::default())
            .await
            .unwrap();
        assert!(out.starts_with("phi3:mini"));
    }

    #[tokio::test]
    async fn empty_model_table_is_a_backend_error() {
        let manager = ModelManager::new(Arc::new(EchoBackend), HashMap::new());
        let err = manager
            .generate("default", "x", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Backend(_)));
        assert!(!err.is_offline());
    }

    #[test]
    fn offline_fallback_embeds_truncated_echo() {
        let long_input = "a".repeat(300);
        let reply = offline_fallback(&long_input);
        assert!(reply.starts_with(OFFLINE_FALLBACK_PREFIX));
        assert!(reply.contains(&"a".repeat(100)));
        assert!(!reply.contains(&"a".repeat(101)));
    }

    #[test]
    fn offline_fallback_keeps_short_input_whole() {
        let reply = offline_fallback("What time is it?");
        assert!(reply.contains("What time is it?"));
    }
}
