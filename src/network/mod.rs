// ============================================================================
// Network Activity of Frozen Pages
// ============================================================================
//
// Requests that are still in flight when a page is frozen keep running, but
// under limits:
//
// - body bytes received while stored count against a per-process ceiling
// - a redirect while frozen evicts the page and is never followed
// - a fetch() body drained as bytes when the freeze lands evicts the page
// - anything still loading after the grace period evicts the page
//
// ============================================================================

pub mod budget;
pub mod monitor;
pub mod request;

pub use budget::{BudgetCheck, BufferedBytesLedger, ProcessByteBudget};
pub use monitor::{ActiveRequestMonitor, FrozenCheck, MonitorVerdict, RedirectDecision};
pub use request::{BodyConsumer, RequestDescriptor, RequestOrigin, RequestSet};
