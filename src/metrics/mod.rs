// ============================================================================
// Outcome Reporting
// ============================================================================
//
// Each history navigation ends in exactly one outcome: the page was restored
// from the cache, or it was not and here is why. Outcomes fan out to any
// number of observers. Pages excluded by the blocked-websites list are never
// reported.
//
// ============================================================================

pub mod observer;

pub use observer::{
    CacheStats, HistoryNavigationOutcome, MetricsObserverBridge, OutcomeObserver, OutcomeRecord,
    RecordingObserver, TracingObserver,
};
