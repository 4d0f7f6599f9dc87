// ============================================================================
// Eviction
// ============================================================================
//
// Every path that removes a page from the cache goes through the
// EvictionDispatcher: time-to-live expiry, capacity overflow, network rules,
// feature use while frozen, no-store policy at restore time, renderer death.
// Evicting a page twice is a no-op.
//
// ============================================================================

pub mod dispatcher;

pub use dispatcher::{EvictionDispatcher, EvictionRecord, EvictionResult};
