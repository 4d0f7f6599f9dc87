// ============================================================================
// Cache Storage
// ============================================================================
//
// Stored pages live in a fixed number of slots. Slots are ordered by store
// time; when every slot is taken the oldest page makes room for the new one.
// Lookups never change that order.
//
// ============================================================================

pub mod entry;
pub mod slots;

pub use entry::{CachedPageEntry, TimerKind};
pub use slots::StorageSlotManager;
