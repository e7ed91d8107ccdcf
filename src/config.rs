//! Configuration.
//!
//! One typed value loaded at startup (TOML, every field defaulted) and
//! passed into each component at construction time — components never read
//! ambient process state, so they stay independently testable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub memory: MemoryConfig,
    pub voice: VoiceConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing path (or `None`)
    /// yields the defaults; a present but invalid file is an error rather
    /// than a silent fallback.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

// ── Server ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Bind address string for the TCP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3113,
        }
    }
}

// ── Generation ───────────────────────────────────────────────────

/// A named model entry in the model table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Backend model identifier (e.g. `phi3:mini`).
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Completion endpoint (Ollama, llama.cpp server, or compatible).
    pub endpoint: String,
    /// Per-request deadline. Aborts only the in-flight request.
    pub timeout_secs: u64,
    /// Model table keyed by alias (`default`, `code`, ...).
    pub models: HashMap<String, ModelSpec>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "default".to_string(),
            ModelSpec {
                name: "phi3:mini".to_string(),
                description: "Default chat model".to_string(),
            },
        );
        models.insert(
            "code".to_string(),
            ModelSpec {
                name: "codellama:7b".to_string(),
                description: "Code generation model".to_string(),
            },
        );
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            timeout_secs: 30,
            models,
        }
    }
}

// ── Memory ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Retained turn count; oldest turns are evicted first.
    pub max_turns: usize,
    /// Context window size handed to the turn pipeline.
    pub context_turns: usize,
    /// Path of the JSON memory document. Defaults to the platform data dir.
    pub store_path: Option<PathBuf>,
}

impl MemoryConfig {
    /// Resolve the memory document path.
    pub fn resolved_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "aura")
            .map(|dirs| dirs.data_dir().join("memory.json"))
            .unwrap_or_else(|| PathBuf::from("data/memory.json"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            context_turns: 10,
            store_path: None,
        }
    }
}

// ── Voice ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub tts: TtsConfig,
    pub stt: SttConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub voice: String,
    /// Rate adjustment understood by the engine (e.g. `+0%`).
    pub speed: String,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:8000/synthesize".to_string(),
            voice: "en-US-AriaNeural".to_string(),
            speed: "+0%".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:8000/transcribe".to_string(),
            timeout_secs: 30,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.server.port, 3113);
        assert_eq!(config.generation.timeout_secs, 30);
        assert_eq!(config.generation.models["default"].name, "phi3:mini");
        assert_eq!(config.generation.models["code"].name, "codellama:7b");
        assert_eq!(config.memory.max_turns, 100);
        assert_eq!(config.memory.context_turns, 10);
        assert!(!config.voice.tts.enabled);
        assert!(!config.voice.stt.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/aura.toml"))).unwrap();
        assert_eq!(config.server.listen_addr(), "0.0.0.0:3113");
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let raw = r#"
            [server]
            port = 9000

            [voice.tts]
            enabled = true
            voice = "en-GB-SoniaNeural"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.voice.tts.enabled);
        assert_eq!(config.voice.tts.voice, "en-GB-SoniaNeural");
        assert_eq!(config.voice.tts.speed, "+0%");
        assert_eq!(config.generation.models.len(), 2);
    }

    #[test]
    fn model_table_can_be_replaced() {
        let raw = r#"
            [generation.models.default]
            name = "qwen3:4b"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.generation.models["default"].name, "qwen3:4b");
        // Explicit tables replace the default table wholesale.
        assert!(!config.generation.models.contains_key("code"));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aura.toml");
        std::fs::write(&path, "server = 12").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn store_path_override_wins() {
        let config = MemoryConfig {
            store_path: Some(PathBuf::from("/tmp/custom.json")),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_store_path(),
            PathBuf::from("/tmp/custom.json")
        );
    }
}
