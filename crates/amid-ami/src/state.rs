//! Connection state machine
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Streaming -> Draining
//!       ^              |               |              |           |
//!       +--------------+---------------+--------------+-----------+
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Streaming,
    Draining,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Draining => "draining",
        }
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Streaming)
                | (Streaming, Draining)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state readable from any task
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<ConnectionState>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        *self.0.lock()
    }

    /// Move to `next` if the state machine allows it; returns whether it moved
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.0.lock();
        let current = *state;
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            debug!(from = %current, to = %next, "Ignoring invalid AMI state transition");
            return false;
        }
        debug!(from = %current, to = %next, "AMI state transition");
        *state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SharedState::new();
        assert_eq!(state.get(), ConnectionState::Disconnected);
        assert!(state.transition(ConnectionState::Connecting));
        assert!(state.transition(ConnectionState::Authenticating));
        assert!(state.transition(ConnectionState::Streaming));
        assert!(state.transition(ConnectionState::Draining));
        assert!(state.transition(ConnectionState::Disconnected));
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let state = SharedState::new();
        assert!(!state.transition(ConnectionState::Streaming));
        assert!(!state.transition(ConnectionState::Draining));
        assert_eq!(state.get(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_any_state_can_disconnect() {
        for from in [
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Streaming,
            ConnectionState::Draining,
        ] {
            assert!(from.can_transition_to(ConnectionState::Disconnected));
        }
    }

    #[test]
    fn test_clones_share_state() {
        let state = SharedState::new();
        let observer = state.clone();
        state.transition(ConnectionState::Connecting);
        assert_eq!(observer.get(), ConnectionState::Connecting);
    }
}
