// ============================================================================
// Page Lifecycle
// ============================================================================
//
// A cached page moves through a small state machine:
//
// Live -> Storing -> Stored -> Restoring -> Live
//
// Eviction can interrupt any frozen state. The freeze and resume sequences
// are round trips to the renderer; each event must be acknowledged before
// the next one is sent.
//
// ============================================================================

pub mod controller;
pub mod events;
pub mod renderer;
pub mod state;

pub use controller::FreezeResumeController;
pub use events::{CycleLedger, LifecycleEvent, NavigationCounters, VisibilityState, VisibilityTarget};
pub use renderer::{RecordingRenderer, RendererChannel};
pub use state::LifecycleState;
