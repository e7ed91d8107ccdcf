//! Turn orchestrator: the per-utterance pipeline.
//!
//! One turn runs: state → `thinking`, append the user turn, build the
//! context window, classify intent, run the category handler (generation
//! or canned reply), append the assistant turn, state → `speaking`, emit
//! the `ai_response` event, hand the reply to the speech fan-out, state →
//! `idle`, return.
//!
//! Failure containment: a connectivity failure talking to the generation
//! backend is recovered locally with the offline fallback reply and the
//! turn continues; any other failure aborts the turn, but the session is
//! forced back to `idle` before the error surfaces, and the transport
//! turns it into a single `error` event — the client always receives a
//! terminal event, never silence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::events::ServerMessage;
use crate::intent::{classify, IntentCategory};
use crate::llm::{offline_fallback, GenerationError, GenerationOptions, ModelManager};
use crate::memory::{ContextWindow, ConversationMemory, TurnRole};
use crate::session::Session;
use crate::state::ActivityState;
use crate::util::{now_epoch_ms, truncate_with_ellipsis};
use crate::voice::{fanout, Synthesizer};

/// How many context turns are woven into generation prompts.
const PROMPT_CONTEXT_TURNS: usize = 5;

/// Max output units for conversational replies.
const CASUAL_CHAT_MAX_TOKENS: u32 = 500;

/// Max output units for code generation.
const CODE_GENERATION_MAX_TOKENS: u32 = 1500;

/// Snippet length per turn in system-command summaries.
const SUMMARY_SNIPPET_CHARS: usize = 100;

// ── Routed response ──────────────────────────────────────────────

/// Routing metadata attached to a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Detected intent category.
    pub intent: IntentCategory,
    /// Model alias used for generation, when a model was involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Set when the reply must not be acted on without explicit user
    /// confirmation (generated code is never applied to the filesystem by
    /// this pipeline; file mutation belongs to the file-tools layer).
    #[serde(
        default,
        rename = "requiresConfirmation",
        skip_serializing_if = "Option::is_none"
    )]
    pub requires_confirmation: Option<bool>,
    /// Handler-specific refinement (e.g. `memory` for a memory summary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl ResponseMetadata {
    /// Metadata for a model-generated reply.
    pub fn generated(intent: IntentCategory, model: &str) -> Self {
        Self {
            intent,
            model: Some(model.to_string()),
            requires_confirmation: None,
            subtype: None,
        }
    }

    /// Metadata for a reply produced without a generation call.
    pub fn for_intent(intent: IntentCategory) -> Self {
        Self {
            intent,
            model: None,
            requires_confirmation: None,
            subtype: None,
        }
    }
}

/// Result of a turn: the reply text plus routing metadata. Transient — it
/// is logged into memory as the assistant turn, not persisted itself.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Turn-level failure surfaced to the transport.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Generation(#[from] GenerationError),
}

// ── Orchestrator ─────────────────────────────────────────────────

/// Drives the turn pipeline for all sessions.
///
/// Holds the shared collaborators; per-session state lives in [`Session`]
/// and is passed in by the owning connection task, which also serializes
/// turns within a session.
pub struct Orchestrator {
    models: ModelManager,
    memory: Arc<Mutex<ConversationMemory>>,
    synthesizer: Arc<dyn Synthesizer>,
    context_turns: usize,
}

impl Orchestrator {
    pub fn new(
        models: ModelManager,
        memory: Arc<Mutex<ConversationMemory>>,
        synthesizer: Arc<dyn Synthesizer>,
        context_turns: usize,
    ) -> Self {
        Self {
            models,
            memory,
            synthesizer,
            context_turns,
        }
    }

    /// Process one user utterance end-to-end.
    ///
    /// On success the session has already emitted `ai_response` and any
    /// audio chunks through `out`. On failure the session is back in
    /// `idle` and no partial response was emitted.
    pub async fn process_turn(
        &self,
        session: &mut Session,
        out: &mpsc::UnboundedSender<ServerMessage>,
        user_text: &str,
    ) -> Result<RoutedResponse, TurnError> {
        let turn = session.begin_turn();
        tracing::info!(session = %session.id, turn, "processing turn");

        match self.run_turn(session, out, user_text).await {
            Ok(routed) => Ok(routed),
            Err(e) => {
                tracing::error!(session = %session.id, turn, error = %e, "turn failed");
                session.state.set(ActivityState::Idle);
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        out: &mpsc::UnboundedSender<ServerMessage>,
        user_text: &str,
    ) -> Result<RoutedResponse, TurnError> {
        session.state.set(ActivityState::Thinking);

        let context = {
            let mut memory = self.memory.lock().await;
            memory.append(TurnRole::User, user_text).await;
            memory.context(self.context_turns)
        };

        let intent = classify(user_text);
        tracing::info!(intent = intent.as_str(), "intent detected");

        let routed = match intent {
            IntentCategory::CasualChat => self.handle_casual_chat(user_text, &context).await?,
            IntentCategory::CodeGeneration => {
                self.handle_code_generation(user_text, &context).await?
            }
            IntentCategory::FileOperation => Self::handle_file_operation(),
            IntentCategory::SystemCommand => Self::handle_system_command(user_text, &context),
        };

        self.memory
            .lock()
            .await
            .append(TurnRole::Assistant, &routed.text)
            .await;

        session.state.set(ActivityState::Speaking);

        let _ = out.send(ServerMessage::AiResponse {
            content: routed.text.clone(),
            metadata: routed.metadata.clone(),
            timestamp: now_epoch_ms(),
        });

        // Fire-permitting: the text is already delivered, so synthesis
        // failures stay contained inside the fan-out.
        fanout::stream_speech(Arc::clone(&self.synthesizer), &routed.text, out).await;

        session.state.set(ActivityState::Idle);
        Ok(routed)
    }

    // ── Category handlers ─────────────────────────────────────────

    async fn handle_casual_chat(
        &self,
        user_text: &str,
        context: &ContextWindow,
    ) -> Result<RoutedResponse, TurnError> {
        let text = self
            .generate_reply(
                "default",
                "You are a helpful and friendly AI assistant.",
                user_text,
                context,
                GenerationOptions {
                    max_tokens: CASUAL_CHAT_MAX_TOKENS,
                    ..Default::default()
                },
            )
            .await?;

        Ok(RoutedResponse {
            text,
            metadata: ResponseMetadata::generated(IntentCategory::CasualChat, "default"),
        })
    }

    async fn handle_code_generation(
        &self,
        user_text: &str,
        context: &ContextWindow,
    ) -> Result<RoutedResponse, TurnError> {
        let text = self
            .generate_reply(
                "code",
                "You are an expert programmer. Generate clean, well-commented code. \
                 Ask for confirmation before creating files.",
                user_text,
                context,
                GenerationOptions {
                    max_tokens: CODE_GENERATION_MAX_TOKENS,
                    ..Default::default()
                },
            )
            .await?;

        let mut metadata = ResponseMetadata::generated(IntentCategory::CodeGeneration, "code");
        metadata.requires_confirmation = Some(true);
        Ok(RoutedResponse { text, metadata })
    }

    /// File mutation is delegated to the file-tools layer and requires
    /// explicit confirmation; the pipeline never touches the filesystem.
    fn handle_file_operation() -> RoutedResponse {
        RoutedResponse {
            text: "File operations require explicit confirmation. What would you like me to create?"
                .to_string(),
            metadata: ResponseMetadata::for_intent(IntentCategory::FileOperation),
        }
    }

    fn handle_system_command(user_text: &str, context: &ContextWindow) -> RoutedResponse {
        let lower = user_text.to_lowercase();

        if lower.contains("memory") || lower.contains("history") {
            let summary = context
                .recent
                .iter()
                .enumerate()
                .map(|(i, turn)| {
                    format!(
                        "{}. [{}]: {}",
                        i + 1,
                        turn.role.as_str(),
                        truncate_with_ellipsis(&turn.text, SUMMARY_SNIPPET_CHARS)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            let mut metadata = ResponseMetadata::for_intent(IntentCategory::SystemCommand);
            metadata.subtype = Some("memory".to_string());
            return RoutedResponse {
                text: format!("Recent conversation:\n{summary}"),
                metadata,
            };
        }

        RoutedResponse {
            text: "System command not recognized.".to_string(),
            metadata: ResponseMetadata::for_intent(IntentCategory::SystemCommand),
        }
    }

    /// Run a generation call, recovering connectivity failures with the
    /// offline fallback so the turn is never aborted on an unavailable
    /// backend.
    async fn generate_reply(
        &self,
        alias: &str,
        preamble: &str,
        user_text: &str,
        context: &ContextWindow,
        options: GenerationOptions,
    ) -> Result<String, TurnError> {
        let prompt = build_prompt(preamble, context, user_text);

        match self.models.generate(alias, &prompt, &options).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_offline() => {
                tracing::warn!(error = %e, "generation backend unavailable, using offline fallback");
                Ok(offline_fallback(user_text))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the full generation prompt: instruction preamble, the last few
/// context turns as `role: text` lines, then the raw user text.
fn build_prompt(preamble: &str, context: &ContextWindow, user_text: &str) -> String {
    let mut prompt = format!("{preamble}\n\n");

    let skip = context.recent.len().saturating_sub(PROMPT_CONTEXT_TURNS);
    let window = &context.recent[skip..];
    if !window.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for turn in window {
            prompt.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {user_text}\nAssistant:"));
    prompt
}

// ── Tests ────────────────────────────────────────────────────────
