//! Speech adapters and the synthesis fan-out.
//!
//! `tts` and `stt` talk to external speech engines over HTTP; `fanout`
//! turns a completed reply into an ordered stream of audio chunk events
//! while synthesizing the chunks concurrently.

pub mod fanout;
pub mod stt;
pub mod tts;

pub use tts::{Synthesizer, TtsClient};

/// One sentence-like fragment of a reply, queued for synthesis.
///
/// Ephemeral: created and discarded within a single turn. The `index` is
/// assigned over the raw split (before length filtering) so delivered
/// chunk ordering still reflects original positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechUnit {
    /// Zero-based position in the original split of the reply.
    pub index: usize,
    pub text: String,
    /// Whether this unit is the final one of the reply.
    pub is_last: bool,
}

/// Speech synthesis failure for a single unit. Always contained: a failed
/// unit becomes a silent gap in the stream, never a turn failure.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Synthesis is disabled in configuration.
    #[error("TTS is not enabled; enable it in the [voice.tts] config section")]
    Disabled,

    /// Could not reach the speech engine.
    #[error("speech engine unreachable: {0}")]
    Unreachable(String),

    /// The synthesis request exceeded its deadline.
    #[error("synthesis timed out after {0}s")]
    Timeout(u64),

    /// The engine answered with an error status.
    #[error("speech engine error: {0}")]
    Engine(String),
}
