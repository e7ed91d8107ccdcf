//! Per-connection session state.
//!
//! One `Session` per WebSocket connection, owned exclusively by that
//! connection's task — no lock. The turn orchestrator mutates activity
//! state through the session's state machine; turns within a session are
//! serialized by the connection's receive loop.

use crate::state::{StateMachine, TransitionSink};

/// One client connection's session: activity state plus a monotonically
/// increasing turn counter.
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Activity state machine for this session.
    pub state: StateMachine,
    turns_started: u64,
}

impl Session {
    /// Create a session with no transition sink (tests, tooling).
    pub fn new() -> Self {
        Self::build(StateMachine::new())
    }

    /// Create a session whose state transitions notify the transport.
    pub fn with_sink(sink: TransitionSink) -> Self {
        Self::build(StateMachine::with_sink(sink))
    }

    fn build(state: StateMachine) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            state,
            turns_started: 0,
        }
    }

    /// Start a new turn, returning its 1-based sequence number.
    pub fn begin_turn(&mut self) -> u64 {
        self.turns_started += 1;
        self.turns_started
    }

    /// Number of turns started on this session.
    pub fn turns_started(&self) -> u64 {
        self.turns_started
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ActivityState;

    #[test]
    fn new_session_is_idle_with_zero_turns() {
        let session = Session::new();
        assert!(session.id.starts_with("session_"));
        assert_eq!(session.state.current(), ActivityState::Idle);
        assert_eq!(session.turns_started(), 0);
    }

    #[test]
    fn turn_counter_is_monotonic() {
        let mut session = Session::new();
        assert_eq!(session.begin_turn(), 1);
        assert_eq!(session.begin_turn(), 2);
        assert_eq!(session.begin_turn(), 3);
        assert_eq!(session.turns_started(), 3);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(Session::new().id, Session::new().id);
    }
}
