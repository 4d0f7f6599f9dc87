pub mod error;
pub mod ids;
pub mod origin;
pub mod reason;

pub use error::{CacheError, Result};
pub use ids::{BrowsingInstanceId, CacheIdentity, FrameId, PageId, ProcessId, RequestId};
pub use origin::Origin;
pub use reason::{
    NotRestoredReason, Reason, ReasonCategory, ReasonDetail, ReasonSet, ShouldSwapBrowsingInstance,
};
