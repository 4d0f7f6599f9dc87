use crate::core::{CacheIdentity, FrameId, PageId, ReasonSet, RequestId};
use crate::eligibility::ReasonTree;
use crate::lifecycle::LifecycleState;
use crate::network::BufferedBytesLedger;
use crate::storage::{CachedPageEntry, StorageSlotManager};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{Level, event};

/// What a single eviction tore down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionRecord {
    pub identity: CacheIdentity,
    pub previous_state: LifecycleState,
    /// Everything recorded for the page, latent reasons included
    pub reasons: ReasonSet,
    pub released_requests: Vec<RequestId>,
    pub released_bytes: u64,
    /// Frames of the page, for callers that keep per-frame state
    pub frames: Vec<FrameId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionResult {
    Evicted(EvictionRecord),
    AlreadyEvicted,
    NotFound,
}

/// Single choke point for taking pages out of the cache.
///
/// Also keeps the reasons each page was not stored or was evicted with, so
/// a later history navigation to that page can report them. Both logs hold
/// at most `history` pages; the least recently recorded page is dropped
/// first.
#[derive(Debug)]
pub struct EvictionDispatcher {
    evicted: LruCache<CacheIdentity, ()>,
    not_restored: LruCache<PageId, ReasonTree>,
}

impl EvictionDispatcher {
    pub fn new(history: NonZeroUsize) -> Self {
        Self {
            evicted: LruCache::new(history),
            not_restored: LruCache::new(history),
        }
    }

    /// Evict a stored page and remove it from its slot
    pub fn evict(
        &mut self,
        slots: &mut StorageSlotManager,
        identity: &CacheIdentity,
        reasons: &ReasonSet,
        ledger: &mut BufferedBytesLedger,
    ) -> EvictionResult {
        match slots.take(identity) {
            Some(mut entry) => match self.evict_entry(&mut entry, reasons, ledger) {
                Some(record) => EvictionResult::Evicted(record),
                None => EvictionResult::AlreadyEvicted,
            },
            None if self.evicted.contains(identity) => EvictionResult::AlreadyEvicted,
            None => EvictionResult::NotFound,
        }
    }

    /// Tear down an entry that is not (or no longer) in a slot: one still
    /// being stored, or one displaced by a newer page.
    ///
    /// Returns `None` when the entry was already evicted.
    pub fn evict_entry(
        &mut self,
        entry: &mut CachedPageEntry,
        reasons: &ReasonSet,
        ledger: &mut BufferedBytesLedger,
    ) -> Option<EvictionRecord> {
        let previous_state = entry.state();
        if let Err(e) = entry.transition(LifecycleState::Evicted) {
            event!(Level::DEBUG, identity = %entry.identity(), error = %e, "eviction skipped");
            return None;
        }

        let mut all = entry.latent_reasons();
        all.merge(reasons);
        entry.record_reasons(&all);
        entry.cancel_timers();

        let released_bytes = ledger.release_page(entry.page());
        let released_requests = entry
            .take_requests()
            .clear()
            .into_iter()
            .map(|r| r.id)
            .collect();

        let identity = *entry.identity();
        self.evicted.put(identity, ());
        self.not_restored
            .put(identity.page, entry.not_restored_reasons().clone());

        event!(
            Level::INFO,
            %identity,
            from = %previous_state,
            reasons = %all,
            released_bytes,
            "page evicted"
        );

        Some(EvictionRecord {
            identity,
            previous_state,
            reasons: entry.not_restored_reasons().flatten(),
            released_requests,
            released_bytes,
            frames: entry.frame_ids(),
        })
    }

    /// End a store attempt that failed after the freeze round trip.
    ///
    /// `tree` carries the per-frame reasons found by the re-check; the
    /// entry's latent reasons are added to its root.
    pub fn abort_store(
        &mut self,
        entry: &mut CachedPageEntry,
        mut tree: ReasonTree,
        ledger: &mut BufferedBytesLedger,
    ) -> Option<EvictionRecord> {
        let record = self.evict_entry(entry, &ReasonSet::new(), ledger)?;
        tree.add_root_reasons(&record.reasons);
        let reasons = tree.flatten();
        self.not_restored.put(record.identity.page, tree);
        Some(EvictionRecord { reasons, ..record })
    }

    /// Remember why a page was never stored
    pub fn record_not_stored(&mut self, page: PageId, reasons: ReasonTree) {
        self.not_restored.put(page, reasons);
    }

    pub fn reasons_for(&self, page: PageId) -> Option<&ReasonTree> {
        self.not_restored.peek(&page)
    }

    /// Hand out (and forget) the reasons for `page`
    pub fn take_reasons(&mut self, page: PageId) -> Option<ReasonTree> {
        self.not_restored.pop(&page)
    }

    /// Reset what is known about `page` at the start of a new navigation
    pub fn clear(&mut self, page: PageId) {
        self.not_restored.pop(&page);
        let stale: Vec<CacheIdentity> = self
            .evicted
            .iter()
            .map(|(identity, _)| *identity)
            .filter(|identity| identity.page == page)
            .collect();
        for identity in stale {
            self.evicted.pop(&identity);
        }
    }

    /// Number of pages with recorded reasons
    pub fn history_len(&self) -> usize {
        self.not_restored.len()
    }

    pub fn was_evicted(&self, identity: &CacheIdentity) -> bool {
        self.evicted.contains(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NotRestoredReason, ProcessId};
    use crate::eligibility::{FrameSnapshot, NoStorePolicy, PageSnapshot};
    use crate::network::{RequestDescriptor, RequestSet};
    use std::collections::HashMap;

    struct Fixture {
        dispatcher: EvictionDispatcher,
        slots: StorageSlotManager,
        ledger: BufferedBytesLedger,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dispatcher: EvictionDispatcher::new(NonZeroUsize::new(8).unwrap()),
                slots: StorageSlotManager::new(NonZeroUsize::new(4).unwrap()),
                ledger: BufferedBytesLedger::new(1_000),
            }
        }

        fn store(&mut self, policy: Option<NoStorePolicy>) -> CacheIdentity {
            let process = ProcessId::new();
            let snapshot = PageSnapshot::new(FrameSnapshot::new("https://a.com/", process));
            let mut requests = RequestSet::new();
            requests.insert(RequestDescriptor::new(
                snapshot.page,
                snapshot.root.id,
                process,
                "https://a.com/img.png",
            ));
            let mut entry = CachedPageEntry::new(snapshot, requests, HashMap::new(), policy);
            entry.mark_stored().unwrap();
            self.ledger.add(process, entry.page(), 100);
            let identity = *entry.identity();
            self.slots.try_store(entry).unwrap();
            identity
        }

        fn evict(&mut self, identity: &CacheIdentity, reason: NotRestoredReason) -> EvictionResult {
            let reasons: ReasonSet = [reason].into_iter().collect();
            self.dispatcher
                .evict(&mut self.slots, identity, &reasons, &mut self.ledger)
        }
    }

    #[test]
    fn test_evict_tears_down_entry() {
        let mut fx = Fixture::new();
        let identity = fx.store(None);

        let EvictionResult::Evicted(record) = fx.evict(&identity, NotRestoredReason::Timeout) else {
            panic!("expected eviction");
        };
        assert_eq!(record.previous_state, LifecycleState::Stored);
        assert_eq!(record.released_bytes, 100);
        assert_eq!(record.released_requests.len(), 1);
        assert!(record.reasons.contains_kind(NotRestoredReason::Timeout));
        assert!(fx.slots.is_empty());
        assert!(fx.dispatcher.was_evicted(&identity));
    }

    #[test]
    fn test_second_eviction_is_noop() {
        let mut fx = Fixture::new();
        let identity = fx.store(None);
        fx.evict(&identity, NotRestoredReason::Timeout);

        assert_eq!(
            fx.evict(&identity, NotRestoredReason::CacheLimit),
            EvictionResult::AlreadyEvicted
        );
        let reasons = fx.dispatcher.reasons_for(identity.page).unwrap().flatten();
        assert!(reasons.contains_kind(NotRestoredReason::Timeout));
        assert!(!reasons.contains_kind(NotRestoredReason::CacheLimit));
    }

    #[test]
    fn test_latent_reasons_are_merged() {
        let mut fx = Fixture::new();
        let identity = fx.store(Some(NoStorePolicy::StoreAndEvict));
        fx.evict(&identity, NotRestoredReason::JavaScriptExecution);

        let reasons = fx.dispatcher.take_reasons(identity.page).unwrap().flatten();
        assert!(reasons.contains_kind(NotRestoredReason::CacheControlNoStore));
        assert!(reasons.contains_kind(NotRestoredReason::JavaScriptExecution));
        assert!(fx.dispatcher.take_reasons(identity.page).is_none());
    }

    #[test]
    fn test_unknown_identity() {
        let mut fx = Fixture::new();
        let identity = CacheIdentity::new(Default::default(), 0, PageId::new());
        assert_eq!(
            fx.evict(&identity, NotRestoredReason::Timeout),
            EvictionResult::NotFound
        );
    }

    #[test]
    fn test_in_place_eviction_of_storing_entry() {
        let mut fx = Fixture::new();
        let snapshot = PageSnapshot::new(FrameSnapshot::new("https://a.com/", ProcessId::new()));
        let mut entry = CachedPageEntry::new(snapshot, RequestSet::new(), HashMap::new(), None);
        let reasons: ReasonSet = [NotRestoredReason::NetworkRequestRedirected].into_iter().collect();

        let record = fx
            .dispatcher
            .evict_entry(&mut entry, &reasons, &mut fx.ledger)
            .unwrap();
        assert_eq!(record.previous_state, LifecycleState::Storing);
        assert_eq!(entry.state(), LifecycleState::Evicted);
        assert!(fx.dispatcher.evict_entry(&mut entry, &reasons, &mut fx.ledger).is_none());
    }

    #[test]
    fn test_abort_store_keeps_frame_structure() {
        let mut fx = Fixture::new();
        let process = ProcessId::new();
        let child = FrameSnapshot::new("https://a.com/child", process);
        let child_id = child.id;
        let snapshot = PageSnapshot::new(FrameSnapshot::new("https://a.com/", process).with_child(child));
        let page = snapshot.page;
        let mut entry = CachedPageEntry::new(
            snapshot,
            RequestSet::new(),
            HashMap::new(),
            Some(NoStorePolicy::StoreAndEvict),
        );

        let mut root = crate::eligibility::ReasonNode::for_frame(&entry.snapshot().root, true);
        let mut child_node =
            crate::eligibility::ReasonNode::for_frame(&entry.snapshot().root.children[0], true);
        child_node.reasons.insert(NotRestoredReason::BlocklistedFeatures);
        root.children.push(child_node);

        let record = fx
            .dispatcher
            .abort_store(&mut entry, ReasonTree::new(root), &mut fx.ledger)
            .unwrap();
        assert!(record.reasons.contains_kind(NotRestoredReason::BlocklistedFeatures));
        assert!(record.reasons.contains_kind(NotRestoredReason::CacheControlNoStore));

        let tree = fx.dispatcher.reasons_for(page).unwrap();
        assert!(tree.node(child_id).unwrap().reasons.contains_kind(NotRestoredReason::BlocklistedFeatures));
        assert!(tree.root().reasons.contains_kind(NotRestoredReason::CacheControlNoStore));
    }

    #[test]
    fn test_reason_log_is_bounded() {
        let mut fx = Fixture::new();
        let mut pages = Vec::new();
        for _ in 0..20 {
            let frame = FrameSnapshot::new("https://a.com/", ProcessId::new());
            let page = PageId::new();
            let tree = ReasonTree::from_root_reasons(
                frame.id,
                frame.url.clone(),
                [NotRestoredReason::RelatedActiveContentsExist].into_iter().collect(),
            );
            fx.dispatcher.record_not_stored(page, tree);
            pages.push(page);
        }

        assert_eq!(fx.dispatcher.history_len(), 8);
        assert!(fx.dispatcher.reasons_for(pages[0]).is_none());
        assert!(fx.dispatcher.reasons_for(pages[19]).is_some());
    }

    #[test]
    fn test_clear_forgets_eviction() {
        let mut fx = Fixture::new();
        let identity = fx.store(None);
        fx.evict(&identity, NotRestoredReason::Timeout);

        fx.dispatcher.clear(identity.page);
        assert!(!fx.dispatcher.was_evicted(&identity));
        assert!(fx.dispatcher.reasons_for(identity.page).is_none());
    }
}
