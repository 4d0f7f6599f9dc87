use crate::core::{CacheIdentity, NotRestoredReason, PageId, ReasonSet};
use crate::eligibility::{PageSnapshot, ReasonTree};
use crate::lifecycle::{LifecycleState, NavigationCounters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    #[default]
    Normal,
    /// `location.replace()`: the old history entry disappears, so the page
    /// has nothing to be restored into
    Replace,
}

/// The navigation subsystem is leaving `page`
#[derive(Debug, Clone)]
pub struct NavigateAway {
    pub page: PageSnapshot,
    pub kind: NavigationKind,
}

impl NavigateAway {
    pub fn new(page: PageSnapshot) -> Self {
        Self {
            page,
            kind: NavigationKind::Normal,
        }
    }

    pub fn replace(page: PageSnapshot) -> Self {
        Self {
            page,
            kind: NavigationKind::Replace,
        }
    }
}

/// Back or forward navigation to a history entry
#[derive(Debug, Clone, Copy)]
pub struct HistoryNavigation {
    pub target: CacheIdentity,
    pub counters: NavigationCounters,
}

impl HistoryNavigation {
    pub fn new(target: CacheIdentity, counters: NavigationCounters) -> Self {
        Self { target, counters }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored(CacheIdentity),
    NotStored(ReasonTree),
    Replaced,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored(_))
    }

    pub fn reasons(&self) -> ReasonSet {
        match self {
            StoreOutcome::NotStored(tree) => tree.flatten(),
            _ => ReasonSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(CacheIdentity),
    NotRestored {
        reasons: ReasonSet,
        tree: Option<ReasonTree>,
    },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored(_))
    }

    pub fn reasons(&self) -> ReasonSet {
        match self {
            RestoreOutcome::Restored(_) => ReasonSet::new(),
            RestoreOutcome::NotRestored { reasons, .. } => reasons.clone(),
        }
    }

    pub fn tree(&self) -> Option<&ReasonTree> {
        match self {
            RestoreOutcome::NotRestored { tree, .. } => tree.as_ref(),
            RestoreOutcome::Restored(_) => None,
        }
    }
}

/// Service worker activity that reaches into a controlled page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceWorkerEvent {
    Claim,
    Unregistration,
    VersionActivation,
    PostMessage,
}

impl ServiceWorkerEvent {
    pub fn reason(&self) -> NotRestoredReason {
        match self {
            ServiceWorkerEvent::Claim => NotRestoredReason::ServiceWorkerClaim,
            ServiceWorkerEvent::Unregistration => NotRestoredReason::ServiceWorkerUnregistration,
            ServiceWorkerEvent::VersionActivation => NotRestoredReason::ServiceWorkerVersionActivation,
            ServiceWorkerEvent::PostMessage => NotRestoredReason::ServiceWorkerPostMessage,
        }
    }
}

/// What happened to a script execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDisposition {
    Executed,
    /// The page was frozen; it was evicted and the script never ran
    EvictedInstead,
}

/// Inspection view of one stored page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPageInfo {
    pub identity: CacheIdentity,
    pub page: PageId,
    pub url: String,
    pub state: LifecycleState,
    pub stored_for_ms: u64,
    pub pending_requests: usize,
    pub no_store: bool,
}
