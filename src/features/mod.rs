// ============================================================================
// Blocking Features
// ============================================================================
//
// Features a page can use that keep it out of the back/forward cache.
// Sticky features disqualify the document for good once used; non-sticky
// ones only while the usage is still active at freeze time.
//
// ============================================================================

pub mod registry;
pub mod usage;

pub use registry::{Feature, FeatureFlagRegistry, Stickiness};
pub use usage::{FeatureUsage, FeatureUsageTable, UsageState};
