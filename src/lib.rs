// ============================================================================
// RustBFCache Library
// ============================================================================
//
// Back/forward cache engine: decides whether a page being navigated away
// from can be kept frozen in memory, keeps it there under resource limits,
// and brings it back instantly on a history navigation, or reports why it
// could not.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod eligibility;
pub mod eviction;
pub mod facade;
pub mod features;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod storage;

// Re-export main types for convenience
pub use config::CacheConfig;
pub use core::{
    CacheError, CacheIdentity, FrameId, NotRestoredReason, Origin, PageId, ProcessId, Reason,
    ReasonSet, RequestId, Result,
};
pub use eligibility::{
    CookieChangeKind, DisableMessage, DisabledReason, FrameSnapshot, NoStorePolicy, PageSnapshot,
    PageVisibleReasons, ReasonTree, ResponseInfo,
};
pub use facade::{
    BackForwardCache, HistoryNavigation, NavigateAway, NavigationKind, RestoreOutcome,
    ScriptDisposition, ServiceWorkerEvent, StoreOutcome, StoredPageInfo,
};
pub use features::Feature;
pub use lifecycle::{LifecycleEvent, LifecycleState, NavigationCounters, RecordingRenderer, RendererChannel};
pub use metrics::{CacheStats, HistoryNavigationOutcome, OutcomeObserver, RecordingObserver, TracingObserver};
pub use network::{BodyConsumer, RedirectDecision, RequestDescriptor};
