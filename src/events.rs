//! WebSocket event schema for the assistant session protocol.
//!
//! Defines the JSON message types exchanged between a client and the aura
//! gateway over one persistent connection.
//!
//! ## Protocol
//!
//! ```text
//! Client ──text_input / get_state──▸ Gateway ──▸ Turn pipeline
//!    ◂── state / ai_response / ai_audio_chunk / error ──◂
//! ```
//!
//! All messages are JSON text frames. Audio payloads use base64 encoding
//! within JSON (upgrade to binary frames is a future optimization).

use serde::{Deserialize, Serialize};

use crate::orchestrator::ResponseMetadata;
use crate::state::ActivityState;

// ── Client → Server messages ──────────────────────────────────────

/// Messages sent from the client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A user utterance to run through the turn pipeline.
    TextInput {
        /// Raw utterance text.
        content: String,
    },

    /// Ask for the current activity state. No pipeline side effects.
    GetState,
}

// ── Server → Client messages ──────────────────────────────────────

/// Messages sent from the gateway to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Activity state snapshot. Emitted on initial connect and on every
    /// state transition.
    State {
        state: ActivityState,
        /// Epoch milliseconds.
        timestamp: u64,
    },

    /// The completed assistant reply for a turn. Exactly one per turn that
    /// does not end in an error.
    AiResponse {
        content: String,
        metadata: ResponseMetadata,
        timestamp: u64,
    },

    /// One synthesized speech chunk. Zero or more per turn, strictly
    /// ordered by `index`; `isLast` marks the final unit of the reply so
    /// the client can detect stream completion without an end message.
    AiAudioChunk {
        /// Base64-encoded audio data.
        audio: String,
        index: usize,
        #[serde(rename = "isLast")]
        is_last: bool,
        timestamp: u64,
    },

    /// Unrecoverable turn failure. The terminal event for a turn when no
    /// `ai_response` could be produced.
    Error { message: String },
}

// ── Tests ──────────────────────────────────────────────────────────
