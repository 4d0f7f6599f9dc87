use super::events::LifecycleEvent;
use crate::core::{CacheError, PageId, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Connection to the renderer hosting a page.
///
/// `dispatch` resolves once the renderer acknowledges the event.
#[async_trait]
pub trait RendererChannel: Send + Sync {
    async fn dispatch(&self, page: PageId, event: LifecycleEvent) -> Result<()>;

    /// Tear down a page that will never be shown again
    async fn discard(&self, page: PageId);
}

/// Renderer that acknowledges immediately and keeps a log of what it saw.
///
/// Individual events can be made to stall (never acknowledged) or fail,
/// which is how renderer hangs and crashes are simulated.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    log: Mutex<Vec<(PageId, LifecycleEvent)>>,
    discarded: Mutex<Vec<PageId>>,
    stalled: Mutex<HashSet<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never acknowledge events named `event`
    pub fn stall_on(&self, event: &'static str) {
        lock(&self.stalled).insert(event);
    }

    pub fn fail_on(&self, event: &'static str) {
        lock(&self.failing).insert(event);
    }

    pub fn clear_faults(&self) {
        lock(&self.stalled).clear();
        lock(&self.failing).clear();
    }

    pub fn events_for(&self, page: PageId) -> Vec<LifecycleEvent> {
        lock(&self.log)
            .iter()
            .filter(|(p, _)| *p == page)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn event_names_for(&self, page: PageId) -> Vec<&'static str> {
        self.events_for(page).iter().map(|e| e.name()).collect()
    }

    pub fn discarded(&self) -> Vec<PageId> {
        lock(&self.discarded).clone()
    }
}

#[async_trait]
impl RendererChannel for RecordingRenderer {
    async fn dispatch(&self, page: PageId, event: LifecycleEvent) -> Result<()> {
        let name = event.name();
        lock(&self.log).push((page, event));

        if lock(&self.failing).contains(name) {
            return Err(CacheError::RendererError(format!("{} failed for {}", name, page)));
        }
        if lock(&self.stalled).contains(name) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn discard(&self, page: PageId) {
        lock(&self.discarded).push(page);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
