//! Connection manager state machine

use std::fmt;

use serde::Serialize;

use crate::error::DatabaseError;

/// Lifecycle state of a connection manager
///
/// ```text
/// Uninitialized ──► Connecting ──► Ready
///                     ▲  │  ▲        │ liveness check failed
///                     │  │  └────────┘
///                     │  └──► Failed ──(reinitialize)──► Uninitialized
///   any ──(shutdown)──► Closed ──(reinitialize)──► Uninitialized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// No transport has been requested yet
    Uninitialized,
    /// Establishment (with retries) in progress
    Connecting,
    /// A live transport is available
    Ready,
    /// Retries exhausted; terminal until re-initialised
    Failed,
    /// Shut down explicitly; terminal until re-initialised
    Closed,
}

impl ManagerState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ManagerState) -> bool {
        use ManagerState::*;

        matches!(
            (self, next),
            (Uninitialized, Connecting)
                // an establishment abandoned by a cancelled caller is resumed
                | (Connecting, Connecting)
                | (Connecting, Ready)
                | (Connecting, Failed)
                // fatal (non-transient) establishment error
                | (Connecting, Uninitialized)
                | (Ready, Connecting)
                | (Failed, Uninitialized)
                | (Closed, Uninitialized)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ManagerState) -> Result<(), DatabaseError> {
        if !self.can_transition_to(next) {
            return Err(DatabaseError::invalid_state(format!("{} -> {}", self, next)));
        }
        *self = next;
        Ok(())
    }

    /// Returns true for states that refuse acquisitions until re-initialised
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagerState::Failed | ManagerState::Closed)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = ManagerState::Uninitialized;
        assert!(state.transition(ManagerState::Connecting).is_ok());
        assert!(state.transition(ManagerState::Ready).is_ok());
    }

    #[test]
    fn test_liveness_failure_reconnects() {
        let mut state = ManagerState::Ready;
        assert!(state.transition(ManagerState::Connecting).is_ok());
        assert!(state.transition(ManagerState::Failed).is_ok());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_requires_reinitialize() {
        let mut state = ManagerState::Failed;
        assert!(state.transition(ManagerState::Connecting).is_err());
        assert!(state.transition(ManagerState::Uninitialized).is_ok());
    }

    #[test]
    fn test_cannot_skip_connecting() {
        let mut state = ManagerState::Uninitialized;
        assert!(state.transition(ManagerState::Ready).is_err());
        assert_eq!(state, ManagerState::Uninitialized);
    }

    #[test]
    fn test_close_from_any_state() {
        for mut state in [
            ManagerState::Uninitialized,
            ManagerState::Connecting,
            ManagerState::Ready,
            ManagerState::Failed,
            ManagerState::Closed,
        ] {
            assert!(state.transition(ManagerState::Closed).is_ok());
        }
    }
}
