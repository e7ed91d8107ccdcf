//! Per-session activity state machine.
//!
//! Tracks which coarse phase a session is in so the presentation layer can
//! render it: `idle`, `listening`, `thinking`, `speaking`. Transitions are
//! unguarded (any state may move to any other); what is validated is the
//! state *name* when it arrives from outside as a string. Every transition
//! is appended to a capped diagnostic history and pushed synchronously to
//! an optional transition sink installed by the transport.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::now_epoch_ms;

/// Maximum retained state transitions. History is diagnostic only.
const HISTORY_CAP: usize = 200;

// ── Activity state ───────────────────────────────────────────────

/// Coarse activity phase of a session. Exactly one value is active at a time.
///
/// `Listening` is reserved for voice-input capture and is reachable from
/// outside the text pipeline, which itself only cycles
/// `Idle → Thinking → Speaking → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl ActivityState {
    /// Get the wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "listening" => Ok(Self::Listening),
            "thinking" => Ok(Self::Thinking),
            "speaking" => Ok(Self::Speaking),
            other => Err(StateError::InvalidState(other.to_string())),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

/// State machine errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The requested state name is not one of the recognized values.
    /// Fatal to the call that triggered it, never to the process.
    #[error("invalid state: {0}. Valid states: idle, listening, thinking, speaking")]
    InvalidState(String),
}

// ── Transition record ────────────────────────────────────────────

/// One recorded state transition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from: ActivityState,
    /// State after the transition.
    pub to: ActivityState,
    /// Epoch milliseconds when the transition happened.
    pub timestamp: u64,
}

/// Callback invoked synchronously on every transition, before the pipeline
/// proceeds. Installed by the transport to broadcast `state` events; it is
/// an observability signal, not an acknowledgment.
pub type TransitionSink = Box<dyn Fn(&StateTransition) + Send + Sync>;

// ── State machine ────────────────────────────────────────────────

/// Activity state machine for a single session.
pub struct StateMachine {
    current: ActivityState,
    history: VecDeque<StateTransition>,
    sink: Option<TransitionSink>,
}

impl StateMachine {
    /// Create a state machine starting in `idle`, with no sink.
    pub fn new() -> Self {
        Self {
            current: ActivityState::Idle,
            history: VecDeque::new(),
            sink: None,
        }
    }

    /// Create a state machine with a transition sink installed.
    pub fn with_sink(sink: TransitionSink) -> Self {
        Self {
            current: ActivityState::Idle,
            history: VecDeque::new(),
            sink: Some(sink),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> ActivityState {
        self.current
    }

    /// Check whether the machine is currently in `state`.
    pub fn is(&self, state: ActivityState) -> bool {
        self.current == state
    }

    /// Transition to `next`. Unconditional: any state may move to any other.
    pub fn set(&mut self, next: ActivityState) -> StateTransition {
        let transition = StateTransition {
            from: self.current,
            to: next,
            timestamp: now_epoch_ms(),
        };
        self.current = next;

        self.history.push_back(transition);
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }

        tracing::debug!(from = %transition.from, to = %transition.to, "state transition");

        if let Some(sink) = &self.sink {
            sink(&transition);
        }

        transition
    }

    /// Transition to a state supplied by name (e.g. from an external
    /// command). An unrecognized name fails and leaves the current state
    /// unchanged.
    pub fn set_named(&mut self, name: &str) -> Result<StateTransition, StateError> {
        let next = name.parse::<ActivityState>()?;
        Ok(self.set(next))
    }

    /// Return up to the `limit` most recent transitions, oldest first.
    pub fn history(&self, limit: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).copied().collect()
    }

    /// Reset to `idle`.
    pub fn reset(&mut self) -> StateTransition {
        self.set(ActivityState::Idle)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
