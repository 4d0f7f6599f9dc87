// ============================================================================
// Eligibility
// ============================================================================
//
// Decides whether a document may enter the back/forward cache:
//
// - frame:       owned snapshot of the frame tree handed over by navigation
// - disabled:    capability table of externally registered disable reasons
// - no_store:    cache-control: no-store enforcement levels
// - evaluator:   aggregation of every source of NotRestoredReasons
// - reason_tree: per-frame result plus the cross-origin-safe page view
//
// ============================================================================

pub mod disabled;
pub mod evaluator;
pub mod frame;
pub mod no_store;
pub mod reason_tree;

pub use disabled::{DisableMessage, DisabledReason, DisabledReasonRegistry};
pub use evaluator::{EligibilityEvaluator, EvaluationPhase};
pub use frame::{FrameSnapshot, PageSnapshot, ResponseInfo};
pub use no_store::{CookieChangeKind, CookieModifications, NoStorePolicy};
pub use reason_tree::{PageVisibleReasons, ReasonNode, ReasonTree};
