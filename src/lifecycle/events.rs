use crate::core::{CacheError, Result};
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityTarget {
    Document,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityState {
    Hidden,
    Visible,
}

/// History position reported with `pageshow`. Taken fresh at each restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationCounters {
    pub history_length: u32,
    pub history_index: u32,
    pub navigation_start: Instant,
}

impl NavigationCounters {
    pub fn now(history_length: u32, history_index: u32) -> Self {
        Self {
            history_length,
            history_index,
            navigation_start: Instant::now(),
        }
    }
}

/// Events delivered to the page's renderer during freeze and resume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    PageHide { persisted: bool },
    VisibilityChange {
        target: VisibilityTarget,
        state: VisibilityState,
    },
    Freeze,
    Resume,
    PageShow {
        persisted: bool,
        counters: NavigationCounters,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::PageHide { .. } => "pagehide",
            LifecycleEvent::VisibilityChange { .. } => "visibilitychange",
            LifecycleEvent::Freeze => "freeze",
            LifecycleEvent::Resume => "resume",
            LifecycleEvent::PageShow { .. } => "pageshow",
        }
    }

    /// Events sent when a page is put into the cache, in order
    pub fn store_sequence() -> Vec<LifecycleEvent> {
        vec![
            LifecycleEvent::PageHide { persisted: true },
            LifecycleEvent::VisibilityChange {
                target: VisibilityTarget::Window,
                state: VisibilityState::Hidden,
            },
            LifecycleEvent::VisibilityChange {
                target: VisibilityTarget::Document,
                state: VisibilityState::Hidden,
            },
            LifecycleEvent::Freeze,
        ]
    }

    /// Events that must be acknowledged before `pageshow` may be sent
    pub fn resume_sequence() -> Vec<LifecycleEvent> {
        vec![
            LifecycleEvent::Resume,
            LifecycleEvent::VisibilityChange {
                target: VisibilityTarget::Document,
                state: VisibilityState::Visible,
            },
            LifecycleEvent::VisibilityChange {
                target: VisibilityTarget::Window,
                state: VisibilityState::Visible,
            },
        ]
    }

    fn ledger_key(&self) -> (&'static str, Option<VisibilityTarget>, Option<VisibilityState>) {
        match self {
            LifecycleEvent::VisibilityChange { target, state } => {
                (self.name(), Some(*target), Some(*state))
            }
            _ => (self.name(), None, None),
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::VisibilityChange { target, state } => {
                write!(f, "visibilitychange({:?}, {:?})", target, state)
            }
            LifecycleEvent::PageHide { persisted } | LifecycleEvent::PageShow { persisted, .. } => {
                write!(f, "{}(persisted={})", self.name(), persisted)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Guards exactly-once delivery of each event within one store/restore cycle.
///
/// A cycle starts when the page is frozen. Each distinct event (visibility
/// changes are distinguished by target and state) may be sent once until
/// the next cycle begins.
#[derive(Debug, Default)]
pub struct CycleLedger {
    cycle: u32,
    sent: HashMap<(&'static str, Option<VisibilityTarget>, Option<VisibilityState>), u32>,
}

impl CycleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_cycle(&mut self) -> u32 {
        self.cycle += 1;
        self.sent.clear();
        self.cycle
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Record that `event` is about to be sent
    pub fn record(&mut self, event: &LifecycleEvent) -> Result<()> {
        let count = self.sent.entry(event.ledger_key()).or_insert(0);
        if *count > 0 {
            return Err(CacheError::DuplicateLifecycleEvent(format!(
                "{} in cycle {}",
                event, self.cycle
            )));
        }
        *count += 1;
        Ok(())
    }

    pub fn count(&self, name: &str) -> u32 {
        self.sent
            .iter()
            .filter(|((n, _, _), _)| *n == name)
            .map(|(_, c)| *c)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_mirror_each_other() {
        let store = LifecycleEvent::store_sequence();
        assert_eq!(store.first().map(|e| e.name()), Some("pagehide"));
        assert_eq!(store.last().map(|e| e.name()), Some("freeze"));

        let resume = LifecycleEvent::resume_sequence();
        assert_eq!(resume[0].name(), "resume");
        assert!(matches!(
            resume[1],
            LifecycleEvent::VisibilityChange {
                target: VisibilityTarget::Document,
                state: VisibilityState::Visible
            }
        ));
    }

    #[test]
    fn test_ledger_counts_two_visibility_changes_per_side() {
        let mut ledger = CycleLedger::new();
        ledger.begin_cycle();
        for event in LifecycleEvent::store_sequence() {
            ledger.record(&event).unwrap();
        }
        for event in LifecycleEvent::resume_sequence() {
            ledger.record(&event).unwrap();
        }
        assert_eq!(ledger.count("visibilitychange"), 4);
        assert_eq!(ledger.count("pagehide"), 1);
    }

    #[test]
    fn test_ledger_rejects_repeat_within_cycle() {
        let mut ledger = CycleLedger::new();
        ledger.begin_cycle();
        ledger.record(&LifecycleEvent::Freeze).unwrap();
        let err = ledger.record(&LifecycleEvent::Freeze).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateLifecycleEvent(_)));

        assert_eq!(ledger.begin_cycle(), 2);
        assert!(ledger.record(&LifecycleEvent::Freeze).is_ok());
    }
}
