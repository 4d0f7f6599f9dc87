pub mod cache;
pub mod types;

pub use cache::BackForwardCache;
pub use types::{
    HistoryNavigation, NavigateAway, NavigationKind, RestoreOutcome, ScriptDisposition,
    ServiceWorkerEvent, StoreOutcome, StoredPageInfo,
};
