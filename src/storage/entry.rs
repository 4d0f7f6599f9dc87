use crate::core::{CacheIdentity, FrameId, Origin, PageId, ProcessId, ReasonSet, Result};
use crate::eligibility::{CookieChangeKind, CookieModifications, NoStorePolicy, PageSnapshot, ReasonNode, ReasonTree};
use crate::features::FeatureUsage;
use crate::lifecycle::LifecycleState;
use crate::network::RequestSet;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Deadlines armed while a page is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    TimeToLive,
    LoadingGrace,
}

/// A page that is being stored or sits in a cache slot
#[derive(Debug)]
pub struct CachedPageEntry {
    identity: CacheIdentity,
    snapshot: PageSnapshot,
    state: LifecycleState,
    stored_at: Option<Instant>,
    not_restored_reasons: ReasonTree,
    /// Set when the main document was served with `Cache-Control: no-store`
    no_store_policy: Option<NoStorePolicy>,
    cookies: CookieModifications,
    pending_network_requests: RequestSet,
    active_feature_usage: HashMap<FrameId, FeatureUsage>,
    timers: Vec<(TimerKind, AbortHandle)>,
}

impl CachedPageEntry {
    /// New entry in the `Storing` state
    pub fn new(
        snapshot: PageSnapshot,
        requests: RequestSet,
        feature_usage: HashMap<FrameId, FeatureUsage>,
        no_store_policy: Option<NoStorePolicy>,
    ) -> Self {
        let not_restored_reasons = ReasonTree::new(ReasonNode::for_frame(&snapshot.root, true));
        Self {
            identity: snapshot.identity(),
            snapshot,
            state: LifecycleState::Storing,
            stored_at: None,
            not_restored_reasons,
            no_store_policy,
            cookies: CookieModifications::default(),
            pending_network_requests: requests,
            active_feature_usage: feature_usage,
            timers: Vec::new(),
        }
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    pub fn page(&self) -> PageId {
        self.identity.page
    }

    pub fn snapshot(&self) -> &PageSnapshot {
        &self.snapshot
    }

    pub fn url(&self) -> &str {
        self.snapshot.url()
    }

    pub fn origin(&self) -> Origin {
        self.snapshot.root.origin()
    }

    /// Site of the main document; `None` for opaque origins
    pub fn site(&self) -> Option<String> {
        self.origin().site()
    }

    pub fn processes(&self) -> Vec<ProcessId> {
        self.snapshot.root.processes()
    }

    pub fn uses_process(&self, process: ProcessId) -> bool {
        self.processes().contains(&process)
    }

    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.snapshot.frame_ids()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn transition(&mut self, next: LifecycleState) -> Result<()> {
        self.state.transition(next)
    }

    /// Freeze acknowledged; starts the time-to-live clock
    pub fn mark_stored(&mut self) -> Result<()> {
        self.state.transition(LifecycleState::Stored)?;
        self.stored_at = Some(Instant::now());
        Ok(())
    }

    pub fn stored_at(&self) -> Option<Instant> {
        self.stored_at
    }

    pub fn stored_for(&self) -> Duration {
        self.stored_at.map(|at| at.elapsed()).unwrap_or_default()
    }

    pub fn not_restored_reasons(&self) -> &ReasonTree {
        &self.not_restored_reasons
    }

    pub fn record_reasons(&mut self, reasons: &ReasonSet) {
        self.not_restored_reasons.add_root_reasons(reasons);
    }

    pub fn is_no_store(&self) -> bool {
        self.no_store_policy.is_some()
    }

    pub fn record_cookie_change(&mut self, kind: CookieChangeKind) {
        if self.is_no_store() {
            self.cookies.record(kind);
        }
    }

    pub fn cookie_modifications(&self) -> CookieModifications {
        self.cookies
    }

    /// Reasons this page carries silently and that surface when it is
    /// restored or evicted
    pub fn latent_reasons(&self) -> ReasonSet {
        self.no_store_policy
            .map(|policy| policy.restore_blockers(&self.cookies))
            .unwrap_or_default()
    }

    pub fn requests(&self) -> &RequestSet {
        &self.pending_network_requests
    }

    pub fn requests_mut(&mut self) -> &mut RequestSet {
        &mut self.pending_network_requests
    }

    pub fn take_requests(&mut self) -> RequestSet {
        std::mem::take(&mut self.pending_network_requests)
    }

    pub fn feature_usage(&self) -> &HashMap<FrameId, FeatureUsage> {
        &self.active_feature_usage
    }

    pub fn set_feature_usage(&mut self, usage: HashMap<FrameId, FeatureUsage>) {
        self.active_feature_usage = usage;
    }

    pub fn add_timer(&mut self, kind: TimerKind, timer: AbortHandle) {
        self.timers.push((kind, timer));
    }

    /// Forget a timer without aborting it; called by the timer task itself
    /// once it has fired.
    pub fn disarm(&mut self, kind: TimerKind) {
        self.timers.retain(|(k, _)| *k != kind);
    }

    pub fn armed_timers(&self) -> Vec<TimerKind> {
        self.timers.iter().map(|(k, _)| *k).collect()
    }

    pub fn cancel_timers(&mut self) {
        for (_, timer) in self.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Drop for CachedPageEntry {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NotRestoredReason;
    use crate::eligibility::FrameSnapshot;

    fn entry(policy: Option<NoStorePolicy>) -> CachedPageEntry {
        let snapshot = PageSnapshot::new(FrameSnapshot::new("https://a.com/", ProcessId::new()));
        CachedPageEntry::new(snapshot, RequestSet::new(), HashMap::new(), policy)
    }

    #[test]
    fn test_new_entry_is_storing() {
        let mut e = entry(None);
        assert_eq!(e.state(), LifecycleState::Storing);
        assert!(e.stored_at().is_none());
        e.mark_stored().unwrap();
        assert_eq!(e.state(), LifecycleState::Stored);
        assert!(e.stored_at().is_some());
        assert!(e.not_restored_reasons().is_empty());
    }

    #[test]
    fn test_latent_reasons_follow_policy() {
        assert!(entry(None).latent_reasons().is_empty());

        let e = entry(Some(NoStorePolicy::StoreAndEvict));
        assert!(e.latent_reasons().contains_kind(NotRestoredReason::CacheControlNoStore));

        let mut e = entry(Some(NoStorePolicy::RestoreUnlessCookieChange));
        assert!(e.latent_reasons().is_empty());
        e.record_cookie_change(CookieChangeKind::Script);
        assert!(
            e.latent_reasons()
                .contains_kind(NotRestoredReason::CacheControlNoStoreCookieModified)
        );
    }

    #[test]
    fn test_cookie_changes_ignored_without_no_store() {
        let mut e = entry(None);
        e.record_cookie_change(CookieChangeKind::HttpOnly);
        assert!(!e.cookie_modifications().any());
    }
}
