use super::events::{CycleLedger, LifecycleEvent, NavigationCounters};
use super::renderer::RendererChannel;
use crate::core::{CacheError, PageId, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Level, event};

/// Drives freeze and resume round trips with a page's renderer.
///
/// Every event waits for its acknowledgment, bounded by the ack timeout,
/// before the next one is sent. A per-page [`CycleLedger`] rejects any
/// event that would be delivered twice in the same cycle.
pub struct FreezeResumeController {
    renderer: Arc<dyn RendererChannel>,
    ack_timeout: Duration,
    ledgers: Mutex<HashMap<PageId, CycleLedger>>,
}

impl FreezeResumeController {
    pub fn new(renderer: Arc<dyn RendererChannel>, ack_timeout: Duration) -> Self {
        Self {
            renderer,
            ack_timeout,
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// pagehide, both visibility changes, then freeze
    pub async fn freeze(&self, page: PageId) -> Result<()> {
        let cycle = self.with_ledger(page, |ledger| Ok(ledger.begin_cycle()))?;
        event!(Level::DEBUG, %page, cycle, "freezing page");
        for lifecycle_event in LifecycleEvent::store_sequence() {
            self.send(page, lifecycle_event).await?;
        }
        Ok(())
    }

    /// resume and both visibility changes; `pageshow` is sent separately
    /// once the page is committed as live again.
    pub async fn resume(&self, page: PageId) -> Result<()> {
        event!(Level::DEBUG, %page, "resuming page");
        for lifecycle_event in LifecycleEvent::resume_sequence() {
            self.send(page, lifecycle_event).await?;
        }
        Ok(())
    }

    pub async fn page_show(&self, page: PageId, counters: NavigationCounters) -> Result<()> {
        self.send(
            page,
            LifecycleEvent::PageShow {
                persisted: true,
                counters,
            },
        )
        .await
    }

    pub async fn discard(&self, page: PageId) {
        self.forget(page);
        self.renderer.discard(page).await;
    }

    pub fn forget(&self, page: PageId) {
        self.ledgers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&page);
    }

    /// Current cycle number for `page`, if it was ever frozen
    pub fn cycle(&self, page: PageId) -> Option<u32> {
        self.ledgers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&page)
            .map(|l| l.cycle())
    }

    async fn send(&self, page: PageId, lifecycle_event: LifecycleEvent) -> Result<()> {
        self.with_ledger(page, |ledger| ledger.record(&lifecycle_event))?;
        let label = lifecycle_event.to_string();
        match timeout(self.ack_timeout, self.renderer.dispatch(page, lifecycle_event)).await {
            Ok(result) => result,
            Err(_) => {
                event!(Level::WARN, %page, event = %label, "renderer did not acknowledge in time");
                Err(CacheError::RendererTimeout(format!("{} for {}", label, page)))
            }
        }
    }

    fn with_ledger<T>(&self, page: PageId, f: impl FnOnce(&mut CycleLedger) -> Result<T>) -> Result<T> {
        let mut ledgers = self
            .ledgers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(ledgers.entry(page).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RecordingRenderer;

    fn controller() -> (Arc<RecordingRenderer>, FreezeResumeController) {
        let renderer = Arc::new(RecordingRenderer::new());
        let controller = FreezeResumeController::new(renderer.clone(), Duration::from_secs(3));
        (renderer, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_freeze_then_resume_order() {
        let (renderer, controller) = controller();
        let page = PageId::new();
        controller.freeze(page).await.unwrap();
        controller.resume(page).await.unwrap();
        controller
            .page_show(page, NavigationCounters::now(2, 0))
            .await
            .unwrap();

        assert_eq!(
            renderer.event_names_for(page),
            vec![
                "pagehide",
                "visibilitychange",
                "visibilitychange",
                "freeze",
                "resume",
                "visibilitychange",
                "visibilitychange",
                "pageshow"
            ]
        );
        assert_eq!(controller.cycle(page), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_ack_times_out() {
        let (renderer, controller) = controller();
        renderer.stall_on("freeze");
        let page = PageId::new();
        let err = controller.freeze(page).await.unwrap_err();
        assert!(matches!(err, CacheError::RendererTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pageshow_once_per_cycle() {
        let (_renderer, controller) = controller();
        let page = PageId::new();
        controller.freeze(page).await.unwrap();
        controller.page_show(page, NavigationCounters::now(1, 0)).await.unwrap();
        let err = controller
            .page_show(page, NavigationCounters::now(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::DuplicateLifecycleEvent(_)));

        controller.freeze(page).await.unwrap();
        assert!(controller.page_show(page, NavigationCounters::now(1, 0)).await.is_ok());
        assert_eq!(controller.cycle(page), Some(2));
    }
}
