use super::types::{
    HistoryNavigation, NavigateAway, NavigationKind, RestoreOutcome, ScriptDisposition,
    ServiceWorkerEvent, StoreOutcome, StoredPageInfo,
};
use crate::config::{CacheConfig, duration_ms};
use crate::core::{
    CacheError, CacheIdentity, FrameId, NotRestoredReason, Origin, PageId, ProcessId, Reason,
    ReasonSet, RequestId, Result,
};
use crate::eligibility::{
    CookieChangeKind, DisableMessage, DisabledReason, DisabledReasonRegistry, EligibilityEvaluator,
    EvaluationPhase, PageSnapshot, ReasonTree,
};
use crate::eviction::{EvictionDispatcher, EvictionRecord, EvictionResult};
use crate::features::{Feature, FeatureUsageTable};
use crate::lifecycle::{FreezeResumeController, LifecycleState, RendererChannel};
use crate::metrics::{
    CacheStats, HistoryNavigationOutcome, MetricsObserverBridge, OutcomeObserver, OutcomeRecord,
};
use crate::network::{
    ActiveRequestMonitor, BufferedBytesLedger, MonitorVerdict, RedirectDecision,
    RequestDescriptor, RequestSet,
};
use crate::storage::{CachedPageEntry, StorageSlotManager, TimerKind};
use futures::future::join_all;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{Instrument, Level, event, info_span};

/// Where a page currently is, as far as the cache is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    /// Not known to the cache: an ordinary live page
    Live,
    /// Freeze round trip in flight
    Storing,
    /// In a slot (stored or being restored)
    Cached(CacheIdentity),
}

/// Everything mutable, guarded by one lock
struct EngineState {
    features: FeatureUsageTable,
    disabled: DisabledReasonRegistry,
    slots: StorageSlotManager,
    storing: HashMap<PageId, CachedPageEntry>,
    live_requests: HashMap<PageId, RequestSet>,
    request_pages: HashMap<RequestId, PageId>,
    /// Frames of pages that are storing or cached
    frame_pages: HashMap<FrameId, PageId>,
    ledger: BufferedBytesLedger,
    dispatcher: EvictionDispatcher,
    /// Pages excluded by the blocked-websites list; their outcomes are not
    /// reported
    unreported: LruCache<PageId, ()>,
}

impl EngineState {
    fn locate(&self, page: PageId) -> Location {
        if self.storing.contains_key(&page) {
            Location::Storing
        } else if let Some(identity) = self.slots.find_by_page(page) {
            Location::Cached(identity)
        } else {
            Location::Live
        }
    }

    fn state_of(&self, page: PageId) -> LifecycleState {
        match self.locate(page) {
            Location::Live => LifecycleState::Live,
            Location::Storing => self
                .storing
                .get(&page)
                .map(|e| e.state())
                .unwrap_or(LifecycleState::Live),
            Location::Cached(identity) => self
                .slots
                .lookup(&identity)
                .map(|e| e.state())
                .unwrap_or(LifecycleState::Live),
        }
    }

    fn page_of_frame(&self, frame: FrameId) -> Option<PageId> {
        self.frame_pages.get(&frame).copied()
    }

    fn page_of_request(&self, id: RequestId) -> Result<PageId> {
        self.request_pages
            .get(&id)
            .copied()
            .ok_or(CacheError::RequestNotFound(id))
    }

    fn entry_mut(&mut self, page: PageId) -> Option<&mut CachedPageEntry> {
        match self.locate(page) {
            Location::Live => None,
            Location::Storing => self.storing.get_mut(&page),
            Location::Cached(identity) => self.slots.lookup_mut(&identity),
        }
    }

    /// Run `f` on the request set that currently owns `page`'s requests
    fn with_requests<T>(
        &mut self,
        page: PageId,
        f: impl FnOnce(LifecycleState, &mut RequestSet, &mut BufferedBytesLedger) -> T,
    ) -> Option<T> {
        let location = self.locate(page);
        let EngineState {
            storing,
            slots,
            live_requests,
            ledger,
            ..
        } = self;
        match location {
            Location::Storing => storing
                .get_mut(&page)
                .map(|entry| f(entry.state(), entry.requests_mut(), ledger)),
            Location::Cached(identity) => slots
                .lookup_mut(&identity)
                .map(|entry| f(entry.state(), entry.requests_mut(), ledger)),
            Location::Live => live_requests
                .get_mut(&page)
                .map(|requests| f(LifecycleState::Live, requests, ledger)),
        }
    }

    fn evict_page(&mut self, page: PageId, reasons: &ReasonSet) -> Option<EvictionRecord> {
        let record = match self.locate(page) {
            Location::Live => return None,
            Location::Storing => {
                let entry = self.storing.get_mut(&page)?;
                self.dispatcher.evict_entry(entry, reasons, &mut self.ledger)?
            }
            Location::Cached(identity) => {
                match self
                    .dispatcher
                    .evict(&mut self.slots, &identity, reasons, &mut self.ledger)
                {
                    EvictionResult::Evicted(record) => record,
                    EvictionResult::AlreadyEvicted | EvictionResult::NotFound => return None,
                }
            }
        };
        self.forget(&record.frames, &record.released_requests);
        Some(record)
    }

    fn evict_displaced(&mut self, mut entry: CachedPageEntry) -> Option<EvictionRecord> {
        let reasons: ReasonSet = [NotRestoredReason::CacheLimit].into_iter().collect();
        let record = self
            .dispatcher
            .evict_entry(&mut entry, &reasons, &mut self.ledger)?;
        self.forget(&record.frames, &record.released_requests);
        Some(record)
    }

    /// End a store attempt for an entry taken out of `storing`. Returns the
    /// reasons to hand back to the navigation.
    fn abort_store(&mut self, entry: &mut CachedPageEntry, tree: Option<ReasonTree>) -> ReasonTree {
        if let Some(tree) = tree {
            if let Some(record) = self.dispatcher.abort_store(entry, tree, &mut self.ledger) {
                self.forget(&record.frames, &record.released_requests);
            }
        }
        self.forget(&entry.frame_ids(), &[]);
        self.dispatcher
            .reasons_for(entry.page())
            .cloned()
            .unwrap_or_else(|| entry.not_restored_reasons().clone())
    }

    /// Drop per-frame and per-request bookkeeping of a page that is gone
    fn forget(&mut self, frames: &[FrameId], requests: &[RequestId]) {
        self.features.remove_frames(frames);
        self.disabled.remove_frames(frames);
        for frame in frames {
            self.frame_pages.remove(frame);
        }
        for id in requests {
            self.request_pages.remove(id);
        }
    }

    /// Tear down a live page that is being destroyed instead of cached
    fn discard_live_page(&mut self, snapshot: &PageSnapshot) {
        let requests: Vec<RequestId> = self
            .live_requests
            .remove(&snapshot.page)
            .map(|mut set| set.clear().into_iter().map(|r| r.id).collect())
            .unwrap_or_default();
        self.forget(&snapshot.frame_ids(), &requests);
    }

    fn refresh_feature_usage(&mut self, page: PageId) {
        let Some(frames) = self.entry_mut(page).map(|e| e.frame_ids()) else {
            return;
        };
        let usage = self.features.snapshot(&frames);
        if let Some(entry) = self.entry_mut(page) {
            entry.set_feature_usage(usage);
        }
    }
}

struct Inner {
    config: CacheConfig,
    state: Mutex<EngineState>,
    controller: FreezeResumeController,
    monitor: ActiveRequestMonitor,
    metrics: MetricsObserverBridge,
}

/// Back/forward cache engine.
///
/// Cheap to clone; clones share one engine. Every operation runs under a
/// single lock, which is never held while waiting on the renderer, so
/// signals arriving during a freeze or resume round trip are processed in
/// order and observed by the round trip when it completes.
#[derive(Clone)]
pub struct BackForwardCache {
    inner: Arc<Inner>,
}

impl BackForwardCache {
    pub fn new(config: CacheConfig, renderer: Arc<dyn RendererChannel>) -> Result<Self> {
        Self::with_observers(config, renderer, Vec::new())
    }

    pub fn with_observers(
        config: CacheConfig,
        renderer: Arc<dyn RendererChannel>,
        observers: Vec<Arc<dyn OutcomeObserver>>,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_size)
            .ok_or_else(|| CacheError::InvalidConfig("cache_size must be greater than 0".into()))?;
        let history = NonZeroUsize::new(config.reason_history_size).ok_or_else(|| {
            CacheError::InvalidConfig("reason_history_size must be greater than 0".into())
        })?;

        let mut metrics = MetricsObserverBridge::new();
        for observer in observers {
            metrics.add_observer(observer);
        }

        let state = EngineState {
            features: FeatureUsageTable::new(),
            disabled: DisabledReasonRegistry::new(),
            slots: StorageSlotManager::new(capacity),
            storing: HashMap::new(),
            live_requests: HashMap::new(),
            request_pages: HashMap::new(),
            frame_pages: HashMap::new(),
            ledger: BufferedBytesLedger::new(config.max_buffered_bytes_per_process),
            dispatcher: EvictionDispatcher::new(history),
            unreported: LruCache::new(history),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                controller: FreezeResumeController::new(renderer, config.freeze_ack_timeout_duration()),
                monitor: ActiveRequestMonitor::new(&config),
                metrics,
                state: Mutex::new(state),
                config,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// The navigation subsystem is leaving a page. Decide whether it can be
    /// cached and, if so, freeze it and put it in a slot.
    pub async fn navigate_away(&self, request: NavigateAway) -> Result<StoreOutcome> {
        let span = info_span!(
            "bfcache.store",
            page = %request.page.page,
            url = %request.page.url()
        );
        self.store(request).instrument(span).await
    }

    async fn store(&self, request: NavigateAway) -> Result<StoreOutcome> {
        let NavigateAway {
            page: snapshot,
            kind,
        } = request;
        let page = snapshot.page;
        let identity = snapshot.identity();

        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;

            if state.locate(page) != Location::Live {
                return Err(CacheError::InvalidTransition {
                    from: state.state_of(page).to_string(),
                    to: LifecycleState::Storing.to_string(),
                });
            }
            state.dispatcher.clear(page);
            state.unreported.pop(&page);

            if kind == NavigationKind::Replace {
                state.discard_live_page(&snapshot);
                drop(guard);
                self.inner.controller.discard(page).await;
                event!(Level::DEBUG, "history entry replaced; page not cached");
                return Ok(StoreOutcome::Replaced);
            }

            let tree = EligibilityEvaluator::new(&state.features, &state.disabled, &self.inner.config)
                .evaluate(&snapshot, EvaluationPhase::BeforeFreeze);
            if !tree.is_empty() {
                if tree.flatten().contains_kind(NotRestoredReason::DomainNotAllowed) {
                    state.unreported.put(page, ());
                }
                event!(Level::INFO, reasons = %tree.flatten(), "page not eligible");
                state.dispatcher.record_not_stored(page, tree.clone());
                state.discard_live_page(&snapshot);
                drop(guard);
                self.inner.controller.discard(page).await;
                return Ok(StoreOutcome::NotStored(tree));
            }

            let frames = snapshot.frame_ids();
            let no_store_policy = snapshot
                .root
                .response
                .cache_control_no_store
                .then_some(self.inner.config.no_store_policy);
            let requests = state.live_requests.remove(&page).unwrap_or_default();
            let usage = state.features.snapshot(&frames);
            let entry = CachedPageEntry::new(snapshot, requests, usage, no_store_policy);

            if let Err(err) = state.slots.check_insertable(&entry) {
                event!(Level::WARN, error = %err, "page rejected by slot manager");
                let request_ids = entry.requests().ids();
                state.forget(&frames, &request_ids);
                drop(guard);
                self.inner.controller.discard(page).await;
                return Err(err);
            }

            for frame in frames {
                state.frame_pages.insert(frame, page);
            }
            state.storing.insert(page, entry);
        }

        let freeze_result = self.inner.controller.freeze(page).await;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let mut entry = state
            .storing
            .remove(&page)
            .ok_or(CacheError::PageNotFound(page))?;

        // Evicted while the round trip was in flight
        if entry.state() == LifecycleState::Evicted {
            let tree = state.abort_store(&mut entry, None);
            drop(guard);
            self.inner.controller.discard(page).await;
            return Ok(StoreOutcome::NotStored(tree));
        }

        let failure = match &freeze_result {
            Err(err) => {
                let reason = match err {
                    CacheError::RendererTimeout(_) => NotRestoredReason::TimeoutPuttingInCache,
                    _ => NotRestoredReason::RendererProcessKilled,
                };
                event!(Level::WARN, error = %err, "freeze failed");
                Some(ReasonTree::from_root_reasons(
                    entry.snapshot().root.id,
                    entry.url(),
                    [reason].into_iter().collect(),
                ))
            }
            Ok(()) => {
                let tree = EligibilityEvaluator::new(&state.features, &state.disabled, &self.inner.config)
                    .evaluate(entry.snapshot(), EvaluationPhase::AfterFreeze);
                if !tree.is_empty() {
                    Some(tree)
                } else if let MonitorVerdict::Evict(reason) =
                    self.inner.monitor.on_frozen(entry.requests()).verdict
                {
                    Some(ReasonTree::from_root_reasons(
                        entry.snapshot().root.id,
                        entry.url(),
                        [reason].into_iter().collect(),
                    ))
                } else {
                    None
                }
            }
        };

        if let Some(tree) = failure {
            event!(Level::INFO, reasons = %tree.flatten(), "store aborted after freeze");
            let tree = state.abort_store(&mut entry, Some(tree));
            drop(guard);
            self.inner.controller.discard(page).await;
            return Ok(StoreOutcome::NotStored(tree));
        }

        if let Err(err) = state.slots.check_insertable(&entry) {
            event!(Level::WARN, error = %err, "page rejected by slot manager");
            let frames = entry.frame_ids();
            let request_ids = entry.requests().ids();
            state.ledger.release_page(page);
            state.forget(&frames, &request_ids);
            drop(guard);
            self.inner.controller.discard(page).await;
            return Err(err);
        }

        let usage = state.features.snapshot(&entry.frame_ids());
        entry.set_feature_usage(usage);
        entry.mark_stored()?;

        let ttl = self.spawn_timer(identity, TimerKind::TimeToLive, self.inner.config.time_to_live_duration());
        entry.add_timer(TimerKind::TimeToLive, ttl);
        if !entry.requests().is_empty() {
            let grace = self.spawn_timer(identity, TimerKind::LoadingGrace, self.inner.monitor.grace_period());
            entry.add_timer(TimerKind::LoadingGrace, grace);
        }

        let displaced = state.slots.try_store(entry)?;
        let evicted: Vec<EvictionRecord> = displaced
            .and_then(|oldest| state.evict_displaced(oldest))
            .into_iter()
            .collect();
        let stored = state.slots.len();
        drop(guard);

        self.teardown(evicted).await;
        event!(Level::INFO, %identity, stored, "page stored");
        Ok(StoreOutcome::Stored(identity))
    }

    /// Back/forward navigation to `target`. Restores the page when it is
    /// still cached; otherwise reports why it is not.
    pub async fn history_navigate(&self, navigation: HistoryNavigation) -> Result<RestoreOutcome> {
        let span = info_span!("bfcache.restore", identity = %navigation.target);
        self.restore(navigation).instrument(span).await
    }

    async fn restore(&self, navigation: HistoryNavigation) -> Result<RestoreOutcome> {
        let identity = navigation.target;
        let page = identity.page;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(entry) = state.slots.lookup_mut(&identity) else {
            let outcome = self.not_restored_outcome(state, page);
            drop(guard);
            return Ok(outcome);
        };

        if entry.state() != LifecycleState::Stored {
            // Another navigation is already restoring this page; this one
            // loads it fresh instead
            event!(Level::INFO, state = %entry.state(), "page not restorable right now");
            drop(guard);
            return Ok(RestoreOutcome::NotRestored {
                reasons: ReasonSet::new(),
                tree: None,
            });
        }

        let blockers = entry.latent_reasons();
        if !blockers.is_empty() {
            let evicted: Vec<EvictionRecord> = state.evict_page(page, &blockers).into_iter().collect();
            let outcome = self.not_restored_outcome(state, page);
            drop(guard);
            self.teardown(evicted).await;
            return Ok(outcome);
        }

        entry.transition(LifecycleState::Restoring)?;
        let url = entry.url().to_string();
        drop(guard);

        let resumed = self.inner.controller.resume(page).await;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        if !state.slots.contains(&identity) {
            // Evicted while resuming; the caller falls back to a fresh load
            event!(Level::INFO, "evicted during restore");
            let outcome = self.not_restored_outcome(state, page);
            return Ok(outcome);
        }

        if let Err(err) = resumed {
            event!(Level::WARN, error = %err, "resume failed");
            let reasons: ReasonSet = [NotRestoredReason::RendererProcessKilled].into_iter().collect();
            let evicted: Vec<EvictionRecord> = state.evict_page(page, &reasons).into_iter().collect();
            let outcome = self.not_restored_outcome(state, page);
            drop(guard);
            self.teardown(evicted).await;
            return Ok(outcome);
        }

        let mut entry = state
            .slots
            .take(&identity)
            .ok_or(CacheError::PageNotFound(page))?;
        entry.transition(LifecycleState::Live)?;
        entry.cancel_timers();
        state.ledger.release_page(page);
        let mut requests = entry.take_requests();
        requests.reset_frozen_counters();
        if !requests.is_empty() {
            state.live_requests.insert(page, requests);
        }
        for frame in entry.frame_ids() {
            state.frame_pages.remove(&frame);
        }
        state.dispatcher.clear(page);
        drop(guard);
        drop(entry);

        if let Err(err) = self.inner.controller.page_show(page, navigation.counters).await {
            event!(Level::WARN, error = %err, "pageshow not delivered");
        }

        self.inner.metrics.report(OutcomeRecord::new(
            page,
            url,
            HistoryNavigationOutcome::Restored,
        ));
        event!(Level::INFO, %identity, "page restored");
        Ok(RestoreOutcome::Restored(identity))
    }

    /// Build and report the outcome for a page that is not in the cache
    fn not_restored_outcome(&self, state: &mut EngineState, page: PageId) -> RestoreOutcome {
        let tree = state.dispatcher.take_reasons(page);
        let reasons = tree.as_ref().map(|t| t.flatten()).unwrap_or_default();

        if state.unreported.pop(&page).is_none() {
            let url = tree.as_ref().map(|t| t.root().url.clone()).unwrap_or_default();
            let mut record = OutcomeRecord::new(
                page,
                url,
                HistoryNavigationOutcome::NotRestored(reasons.clone()),
            );
            if let Some(tree) = &tree {
                record = record.with_page_visible(tree.to_page_visible());
            }
            self.inner.metrics.report(record);
        }

        RestoreOutcome::NotRestored { reasons, tree }
    }

    // ------------------------------------------------------------------
    // Signals from the renderer and other subsystems
    // ------------------------------------------------------------------

    pub async fn feature_started(&self, frame: FrameId, feature: Feature) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.features.started(frame, feature);

        let Some(page) = state.page_of_frame(frame) else {
            return Ok(());
        };
        state.refresh_feature_usage(page);

        let mut evicted = Vec::new();
        if state.state_of(page) == LifecycleState::Stored
            && !self.inner.config.allowed_features.contains(&feature)
        {
            let reasons: ReasonSet = [Reason::feature(feature)].into_iter().collect();
            evicted.extend(state.evict_page(page, &reasons));
        }
        drop(guard);
        self.teardown(evicted).await;
        Ok(())
    }

    pub async fn feature_stopped(&self, frame: FrameId, feature: Feature) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.features.stopped(frame, feature);
        if let Some(page) = state.page_of_frame(frame) {
            state.refresh_feature_usage(page);
        }
        Ok(())
    }

    /// Apply a registration from an external subsystem. Registering against
    /// a frame of a stored page evicts it.
    pub async fn apply_disable_message(&self, message: DisableMessage) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.disabled.apply(message);

        let mut evicted = Vec::new();
        if let DisableMessage::Register { frame, reason } = message {
            if let Some(page) = state.page_of_frame(frame) {
                if state.state_of(page) == LifecycleState::Stored {
                    let reasons: ReasonSet = [Reason::disabled(reason)].into_iter().collect();
                    evicted.extend(state.evict_page(page, &reasons));
                }
            }
        }
        drop(guard);
        self.teardown(evicted).await;
        Ok(())
    }

    pub async fn disable_for_frame(&self, frame: FrameId, reason: DisabledReason) -> Result<()> {
        self.apply_disable_message(DisableMessage::Register { frame, reason })
            .await
    }

    pub async fn enable_for_frame(&self, frame: FrameId, reason: DisabledReason) -> Result<()> {
        self.apply_disable_message(DisableMessage::Unregister { frame, reason })
            .await
    }

    /// A cookie of `origin` changed. Recorded on cached no-store pages of
    /// that origin and checked when they are restored.
    pub async fn cookie_changed(&self, origin: &Origin, kind: CookieChangeKind) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        for identity in state.slots.identities_with_origin(origin) {
            if let Some(entry) = state.slots.lookup_mut(&identity) {
                entry.record_cookie_change(kind);
            }
        }
        for entry in state.storing.values_mut() {
            if entry.origin().same_origin(origin) {
                entry.record_cookie_change(kind);
            }
        }
        Ok(())
    }

    /// Returns true when the event evicted a cached page
    pub async fn service_worker_event(&self, page: PageId, sw_event: ServiceWorkerEvent) -> Result<bool> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.state_of(page).is_frozen() {
            return Ok(false);
        }
        let reasons: ReasonSet = [sw_event.reason()].into_iter().collect();
        let evicted: Vec<EvictionRecord> = state.evict_page(page, &reasons).into_iter().collect();
        drop(guard);
        let hit = !evicted.is_empty();
        self.teardown(evicted).await;
        Ok(hit)
    }

    /// Something wants to run script in `page`. A frozen page is evicted
    /// instead.
    pub async fn execute_javascript(&self, page: PageId) -> Result<ScriptDisposition> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.state_of(page).is_frozen() {
            return Ok(ScriptDisposition::Executed);
        }
        let reasons: ReasonSet = [NotRestoredReason::JavaScriptExecution].into_iter().collect();
        let evicted: Vec<EvictionRecord> = state.evict_page(page, &reasons).into_iter().collect();
        drop(guard);
        self.teardown(evicted).await;
        Ok(ScriptDisposition::EvictedInstead)
    }

    /// A renderer process died; every cached page it hosted goes with it
    pub async fn renderer_process_gone(&self, process: ProcessId) -> Result<usize> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let mut pages: Vec<PageId> = state
            .slots
            .identities_in_process(process)
            .into_iter()
            .map(|identity| identity.page)
            .collect();
        pages.extend(
            state
                .storing
                .values()
                .filter(|entry| entry.uses_process(process))
                .map(|entry| entry.page()),
        );

        let reasons: ReasonSet = [NotRestoredReason::RendererProcessKilled].into_iter().collect();
        let evicted: Vec<EvictionRecord> = pages
            .into_iter()
            .filter_map(|page| state.evict_page(page, &reasons))
            .collect();
        state.ledger.drop_process(process);
        drop(guard);

        let count = evicted.len();
        event!(Level::INFO, %process, evicted = count, "renderer process gone");
        self.teardown(evicted).await;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------

    /// A page starts a request. Frozen pages cannot start new ones.
    pub async fn request_started(&self, request: RequestDescriptor) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if state.locate(request.page) != Location::Live {
            return Err(CacheError::PageFrozen(request.page));
        }
        state.request_pages.insert(request.id, request.page);
        state
            .live_requests
            .entry(request.page)
            .or_default()
            .insert(request);
        Ok(())
    }

    pub async fn response_started(&self, id: RequestId) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let page = state.page_of_request(id)?;
        let monitor = &self.inner.monitor;
        state
            .with_requests(page, |_, requests, _| monitor.on_response_started(requests, id))
            .ok_or(CacheError::RequestNotFound(id))?
    }

    pub async fn body_received(&self, id: RequestId, bytes: u64) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let page = state.page_of_request(id)?;
        let monitor = &self.inner.monitor;
        let verdict = state
            .with_requests(page, |lifecycle, requests, ledger| {
                monitor.on_body(lifecycle, requests, id, bytes, ledger)
            })
            .ok_or(CacheError::RequestNotFound(id))??;

        let mut evicted = Vec::new();
        if let MonitorVerdict::Evict(reason) = verdict {
            let reasons: ReasonSet = [reason].into_iter().collect();
            evicted.extend(state.evict_page(page, &reasons));
        }
        drop(guard);
        self.teardown(evicted).await;
        Ok(())
    }

    /// A request got a redirect. Frozen pages never follow redirects; the
    /// page is evicted and the redirect cancelled.
    pub async fn redirect_received(&self, id: RequestId) -> Result<RedirectDecision> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let page = state.page_of_request(id)?;
        let monitor = &self.inner.monitor;
        let verdict = state
            .with_requests(page, |lifecycle, requests, _| {
                monitor.on_redirect(lifecycle, requests, id)
            })
            .ok_or(CacheError::RequestNotFound(id))??;

        let MonitorVerdict::Evict(reason) = verdict else {
            return Ok(RedirectDecision::Follow);
        };
        let reasons: ReasonSet = [reason].into_iter().collect();
        let evicted: Vec<EvictionRecord> = state.evict_page(page, &reasons).into_iter().collect();
        drop(guard);
        self.teardown(evicted).await;
        Ok(RedirectDecision::Cancel)
    }

    pub async fn request_completed(&self, id: RequestId) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let page = state.page_of_request(id)?;
        let monitor = &self.inner.monitor;
        state
            .with_requests(page, |_, requests, _| monitor.on_complete(requests, id))
            .ok_or(CacheError::RequestNotFound(id))??;
        state.request_pages.remove(&id);
        if state.live_requests.get(&page).is_some_and(|r| r.is_empty()) {
            state.live_requests.remove(&page);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn is_stored(&self, identity: &CacheIdentity) -> bool {
        let state = self.inner.state.lock().await;
        state
            .slots
            .lookup(identity)
            .is_some_and(|e| e.state() == LifecycleState::Stored)
    }

    pub async fn lifecycle_state(&self, page: PageId) -> LifecycleState {
        self.inner.state.lock().await.state_of(page)
    }

    /// Stored pages, oldest first
    pub async fn stored_pages(&self) -> Vec<StoredPageInfo> {
        let state = self.inner.state.lock().await;
        state
            .slots
            .identities()
            .into_iter()
            .filter_map(|identity| state.slots.lookup(&identity))
            .map(|entry| StoredPageInfo {
                identity: *entry.identity(),
                page: entry.page(),
                url: entry.url().to_string(),
                state: entry.state(),
                stored_for_ms: duration_ms(entry.stored_for()),
                pending_requests: entry.requests().len(),
                no_store: entry.is_no_store(),
            })
            .collect()
    }

    /// Reasons recorded for `page` that a history navigation would report
    pub async fn not_restored_reasons(&self, page: PageId) -> Option<ReasonTree> {
        let state = self.inner.state.lock().await;
        state.dispatcher.reasons_for(page).cloned()
    }

    pub async fn buffered_bytes(&self, process: ProcessId) -> u64 {
        self.inner.state.lock().await.ledger.total(process)
    }

    pub async fn pending_request_count(&self, page: PageId) -> usize {
        let mut guard = self.inner.state.lock().await;
        guard
            .with_requests(page, |_, requests, _| requests.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.stats()
    }

    /// Lifecycle cycle count for `page`: how many times it was frozen
    pub fn freeze_cycles(&self, page: PageId) -> u32 {
        self.inner.controller.cycle(page).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn spawn_timer(&self, identity: CacheIdentity, kind: TimerKind, delay: Duration) -> AbortHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                BackForwardCache { inner }.on_timer(identity, kind).await;
            }
        });
        handle.abort_handle()
    }

    async fn on_timer(&self, identity: CacheIdentity, kind: TimerKind) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(entry) = state.slots.lookup_mut(&identity) else {
            return;
        };
        entry.disarm(kind);
        if entry.state() != LifecycleState::Stored {
            return;
        }

        let reason = match kind {
            TimerKind::TimeToLive => Some(NotRestoredReason::Timeout),
            TimerKind::LoadingGrace => match self.inner.monitor.on_grace_expired(entry.state(), entry.requests()) {
                MonitorVerdict::Evict(reason) => Some(reason),
                MonitorVerdict::Continue => None,
            },
        };
        let Some(reason) = reason else {
            return;
        };

        event!(Level::DEBUG, %identity, ?kind, "deadline reached");
        let reasons: ReasonSet = [reason].into_iter().collect();
        let evicted: Vec<EvictionRecord> = state.evict_page(identity.page, &reasons).into_iter().collect();
        drop(guard);
        self.teardown(evicted).await;
    }

    /// Work that follows an eviction and must not run under the lock
    async fn teardown(&self, evicted: Vec<EvictionRecord>) {
        let mut discards = Vec::with_capacity(evicted.len());
        for record in &evicted {
            self.inner.metrics.report_eviction(record);
            // pages still storing are discarded when their round trip ends
            if record.previous_state != LifecycleState::Storing {
                discards.push(self.inner.controller.discard(record.identity.page));
            }
        }
        join_all(discards).await;
    }
}
