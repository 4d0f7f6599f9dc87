use crate::core::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a cached page
///
/// ```text
/// Live ──store──> Storing ──ack──> Stored ──restore──> Restoring ──ack──> Live
///                    │                │                    │
///                    └───────────────evict─────────────────┴──> Evicted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// The page is the active document of its tab
    Live,

    /// Freeze sequence sent, waiting for the renderer
    Storing,

    /// Frozen and held in a cache slot
    Stored,

    /// Resume sequence sent, waiting for the renderer
    Restoring,

    /// Gone for good; terminal
    Evicted,
}

impl LifecycleState {
    /// Freeze has started and no resume has begun
    pub fn is_frozen(&self) -> bool {
        matches!(self, LifecycleState::Storing | LifecycleState::Stored)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Evicted)
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Live, Storing)
                | (Storing, Stored)
                | (Stored, Restoring)
                | (Restoring, Live)
                | (Storing | Stored | Restoring, Evicted)
        )
    }

    /// Move to `next`, rejecting transitions the state machine does not have
    pub fn transition(&mut self, next: LifecycleState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(CacheError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Live => "live",
            LifecycleState::Storing => "storing",
            LifecycleState::Stored => "stored",
            LifecycleState::Restoring => "restoring",
            LifecycleState::Evicted => "evicted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut state = LifecycleState::Live;
        state.transition(LifecycleState::Storing).unwrap();
        state.transition(LifecycleState::Stored).unwrap();
        state.transition(LifecycleState::Restoring).unwrap();
        state.transition(LifecycleState::Live).unwrap();
        assert_eq!(state, LifecycleState::Live);
    }

    #[test]
    fn test_evicted_is_terminal() {
        let mut state = LifecycleState::Stored;
        state.transition(LifecycleState::Evicted).unwrap();
        assert!(state.is_terminal());
        assert!(state.transition(LifecycleState::Live).is_err());
        assert!(state.transition(LifecycleState::Evicted).is_err());
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut state = LifecycleState::Live;
        let err = state.transition(LifecycleState::Stored).unwrap_err();
        assert!(matches!(err, CacheError::InvalidTransition { .. }));
        assert_eq!(state, LifecycleState::Live);
        assert!(!LifecycleState::Live.can_transition_to(LifecycleState::Evicted));
    }

    #[test]
    fn test_frozen_states() {
        assert!(LifecycleState::Storing.is_frozen());
        assert!(LifecycleState::Stored.is_frozen());
        assert!(!LifecycleState::Restoring.is_frozen());
        assert!(!LifecycleState::Live.is_frozen());
    }
}
