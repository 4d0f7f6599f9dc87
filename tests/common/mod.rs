#![allow(dead_code)]

use async_trait::async_trait;
use rustbfcache::{
    BackForwardCache, CacheConfig, FrameSnapshot, HistoryNavigation, LifecycleEvent,
    NavigationCounters, PageId, PageSnapshot, ProcessId, RecordingObserver, RecordingRenderer,
    RendererChannel, Result,
};
use std::sync::Arc;
use tokio::sync::Notify;

pub fn page(url: &str) -> PageSnapshot {
    PageSnapshot::new(FrameSnapshot::new(url, ProcessId::new()))
}

pub fn page_in(url: &str, process: ProcessId) -> PageSnapshot {
    PageSnapshot::new(FrameSnapshot::new(url, process))
}

pub fn back_to(snapshot: &PageSnapshot) -> HistoryNavigation {
    HistoryNavigation::new(snapshot.identity(), NavigationCounters::now(2, 0))
}

pub struct Harness {
    pub cache: BackForwardCache,
    pub renderer: Arc<RecordingRenderer>,
    pub observer: Arc<RecordingObserver>,
}

pub fn harness(config: CacheConfig) -> Harness {
    let renderer = Arc::new(RecordingRenderer::new());
    let observer = Arc::new(RecordingObserver::new());
    let cache =
        BackForwardCache::with_observers(config, renderer.clone(), vec![observer.clone()]).unwrap();
    Harness {
        cache,
        renderer,
        observer,
    }
}

/// Renderer that holds one named event until the test releases it, so the
/// test can act while a freeze or resume round trip is in flight.
pub struct GatedRenderer {
    pub log: RecordingRenderer,
    gated: &'static str,
    reached: Notify,
    release: Notify,
}

impl GatedRenderer {
    pub fn new(gated: &'static str) -> Self {
        Self {
            log: RecordingRenderer::new(),
            gated,
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Wait until the gated event has been dispatched
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RendererChannel for GatedRenderer {
    async fn dispatch(&self, page: PageId, event: LifecycleEvent) -> Result<()> {
        let gate = event.name() == self.gated;
        self.log.dispatch(page, event).await?;
        if gate {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }

    async fn discard(&self, page: PageId) {
        self.log.discard(page).await;
    }
}

pub fn gated_harness(
    config: CacheConfig,
    gated: &'static str,
) -> (BackForwardCache, Arc<GatedRenderer>, Arc<RecordingObserver>) {
    let renderer = Arc::new(GatedRenderer::new(gated));
    let observer = Arc::new(RecordingObserver::new());
    let cache =
        BackForwardCache::with_observers(config, renderer.clone(), vec![observer.clone()]).unwrap();
    (cache, renderer, observer)
}
