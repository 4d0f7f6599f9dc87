// ============================================================================
// Identifiers
// ============================================================================
//
// Every id is a process-wide monotonically increasing u64. Ids handed in by
// the navigation subsystem can also be constructed directly with `from_raw`.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Allocate a fresh id
            pub fn new() -> Self {
                $name($counter.fetch_add(1, Ordering::SeqCst))
            }

            pub fn from_raw(raw: u64) -> Self {
                $name(raw)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A committed top-level document (one history entry's document)
    PageId,
    NEXT_PAGE_ID,
    "page"
);

define_id!(
    /// A frame inside a page's frame tree
    FrameId,
    NEXT_FRAME_ID,
    "frame"
);

define_id!(
    /// A renderer process
    ProcessId,
    NEXT_PROCESS_ID,
    "process"
);

define_id!(
    /// A browsing-context group (BrowsingInstance)
    BrowsingInstanceId,
    NEXT_BROWSING_INSTANCE_ID,
    "bi"
);

define_id!(
    /// An in-flight network request
    RequestId,
    NEXT_REQUEST_ID,
    "req"
);

/// Key of one cache slot.
///
/// Two navigations to the same URL yield distinct identities: each commit
/// gets its own page id, and a browsing-context-group swap bumps the
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheIdentity {
    pub browsing_instance: BrowsingInstanceId,
    pub generation: u64,
    pub page: PageId,
}

impl CacheIdentity {
    pub fn new(browsing_instance: BrowsingInstanceId, generation: u64, page: PageId) -> Self {
        Self {
            browsing_instance,
            generation,
            page,
        }
    }
}

impl std::fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}/{}", self.browsing_instance, self.generation, self.page)
    }
}
