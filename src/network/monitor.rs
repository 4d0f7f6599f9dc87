use super::budget::{BudgetCheck, BufferedBytesLedger};
use super::request::{BodyConsumer, RequestSet};
use crate::config::CacheConfig;
use crate::core::{CacheError, NotRestoredReason, RequestId, Result};
use crate::lifecycle::LifecycleState;
use std::time::Duration;

/// What the engine should do after a network signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    Continue,
    Evict(NotRestoredReason),
}

/// Answer to the network stack for a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDecision {
    Follow,
    Cancel,
}

/// Result of inspecting a page's requests right after it became stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenCheck {
    pub verdict: MonitorVerdict,
    /// Requests that still need to finish within the grace period
    pub incomplete: Vec<RequestId>,
}

/// Applies the frozen-page network rules to a page's [`RequestSet`].
///
/// Holds no per-page state: requests live with their page (or its cache
/// entry) and byte counts live in the [`BufferedBytesLedger`], both passed in.
#[derive(Debug, Clone)]
pub struct ActiveRequestMonitor {
    grace_period: Duration,
}

impl ActiveRequestMonitor {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn on_response_started(&self, requests: &mut RequestSet, id: RequestId) -> Result<()> {
        let request = requests
            .get_mut(id)
            .ok_or(CacheError::RequestNotFound(id))?;
        request.headers_received = true;
        Ok(())
    }

    /// Body bytes arrived. Only bytes received once the page is stored are
    /// charged to the process budget.
    pub fn on_body(
        &self,
        state: LifecycleState,
        requests: &mut RequestSet,
        id: RequestId,
        bytes: u64,
        ledger: &mut BufferedBytesLedger,
    ) -> Result<MonitorVerdict> {
        let request = requests
            .get_mut(id)
            .ok_or(CacheError::RequestNotFound(id))?;
        request.body_started = true;
        request.total_bytes = request.total_bytes.saturating_add(bytes);

        if state != LifecycleState::Stored || bytes == 0 {
            return Ok(MonitorVerdict::Continue);
        }

        request.bytes_while_frozen = request.bytes_while_frozen.saturating_add(bytes);
        match ledger.add(request.process, request.page, bytes) {
            BudgetCheck::WithinLimit { .. } => Ok(MonitorVerdict::Continue),
            BudgetCheck::Exceeded { total } => {
                log::debug!(
                    "process {} buffered {} bytes for frozen pages (limit {})",
                    request.process,
                    total,
                    ledger.limit()
                );
                Ok(MonitorVerdict::Evict(NotRestoredReason::NetworkExceedsBufferLimit))
            }
        }
    }

    pub fn on_redirect(
        &self,
        state: LifecycleState,
        requests: &RequestSet,
        id: RequestId,
    ) -> Result<MonitorVerdict> {
        if !requests.contains(id) {
            return Err(CacheError::RequestNotFound(id));
        }
        if state.is_frozen() {
            Ok(MonitorVerdict::Evict(NotRestoredReason::NetworkRequestRedirected))
        } else {
            Ok(MonitorVerdict::Continue)
        }
    }

    pub fn on_complete(&self, requests: &mut RequestSet, id: RequestId) -> Result<()> {
        requests
            .remove(id)
            .map(|_| ())
            .ok_or(CacheError::RequestNotFound(id))
    }

    /// Checks made once, when the page enters `Stored`
    pub fn on_frozen(&self, requests: &RequestSet) -> FrozenCheck {
        let drained = requests
            .iter()
            .any(|r| r.consumer == BodyConsumer::BytesConsumer && r.body_started);

        FrozenCheck {
            verdict: if drained {
                MonitorVerdict::Evict(NotRestoredReason::NetworkRequestDatapipeDrainedAsBytesConsumer)
            } else {
                MonitorVerdict::Continue
            },
            incomplete: requests.ids(),
        }
    }

    /// The grace period ran out; anything still outstanding evicts
    pub fn on_grace_expired(&self, state: LifecycleState, requests: &RequestSet) -> MonitorVerdict {
        if state == LifecycleState::Stored && !requests.is_empty() {
            MonitorVerdict::Evict(NotRestoredReason::NetworkRequestTimeout)
        } else {
            MonitorVerdict::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameId, PageId, ProcessId};
    use crate::network::RequestDescriptor;

    struct Fixture {
        monitor: ActiveRequestMonitor,
        ledger: BufferedBytesLedger,
        requests: RequestSet,
        page: PageId,
        process: ProcessId,
    }

    impl Fixture {
        fn new(limit: u64) -> Self {
            Self {
                monitor: ActiveRequestMonitor::new(&CacheConfig::default()),
                ledger: BufferedBytesLedger::new(limit),
                requests: RequestSet::new(),
                page: PageId::new(),
                process: ProcessId::new(),
            }
        }

        fn start(&mut self, consumer: BodyConsumer) -> RequestId {
            let request = RequestDescriptor::new(self.page, FrameId::new(), self.process, "https://a.com/data")
                .consumed_by(consumer);
            let id = request.id;
            self.requests.insert(request);
            id
        }
    }

    #[test]
    fn test_bytes_before_store_are_free() {
        let mut fx = Fixture::new(10);
        let id = fx.start(BodyConsumer::Resource);
        let verdict = fx
            .monitor
            .on_body(LifecycleState::Storing, &mut fx.requests, id, 1_000, &mut fx.ledger)
            .unwrap();
        assert_eq!(verdict, MonitorVerdict::Continue);
        assert_eq!(fx.ledger.total(fx.process), 0);
        assert_eq!(fx.requests.get(id).unwrap().total_bytes, 1_000);
    }

    #[test]
    fn test_stored_bytes_over_limit_evict() {
        let mut fx = Fixture::new(10);
        let id = fx.start(BodyConsumer::Resource);
        let first = fx
            .monitor
            .on_body(LifecycleState::Stored, &mut fx.requests, id, 10, &mut fx.ledger)
            .unwrap();
        assert_eq!(first, MonitorVerdict::Continue);
        assert!(fx.requests.get(id).unwrap().active_while_frozen());

        let second = fx
            .monitor
            .on_body(LifecycleState::Stored, &mut fx.requests, id, 1, &mut fx.ledger)
            .unwrap();
        assert_eq!(
            second,
            MonitorVerdict::Evict(NotRestoredReason::NetworkExceedsBufferLimit)
        );
    }

    #[test]
    fn test_redirect_only_evicts_frozen_pages() {
        let mut fx = Fixture::new(10);
        let id = fx.start(BodyConsumer::Resource);
        assert_eq!(
            fx.monitor.on_redirect(LifecycleState::Live, &fx.requests, id).unwrap(),
            MonitorVerdict::Continue
        );
        assert_eq!(
            fx.monitor.on_redirect(LifecycleState::Stored, &fx.requests, id).unwrap(),
            MonitorVerdict::Evict(NotRestoredReason::NetworkRequestRedirected)
        );
    }

    #[test]
    fn test_bytes_consumer_in_progress_at_freeze() {
        let mut fx = Fixture::new(10);
        let streamer = fx.start(BodyConsumer::ScriptStreamer);
        fx.monitor
            .on_body(LifecycleState::Live, &mut fx.requests, streamer, 5, &mut fx.ledger)
            .unwrap();
        assert_eq!(fx.monitor.on_frozen(&fx.requests).verdict, MonitorVerdict::Continue);

        let drained = fx.start(BodyConsumer::BytesConsumer);
        fx.monitor
            .on_body(LifecycleState::Live, &mut fx.requests, drained, 5, &mut fx.ledger)
            .unwrap();
        let check = fx.monitor.on_frozen(&fx.requests);
        assert_eq!(
            check.verdict,
            MonitorVerdict::Evict(NotRestoredReason::NetworkRequestDatapipeDrainedAsBytesConsumer)
        );
        assert_eq!(check.incomplete.len(), 2);
    }

    #[test]
    fn test_grace_expiry_after_completion_is_harmless() {
        let mut fx = Fixture::new(10);
        let id = fx.start(BodyConsumer::Resource);
        assert_eq!(
            fx.monitor.on_grace_expired(LifecycleState::Stored, &fx.requests),
            MonitorVerdict::Evict(NotRestoredReason::NetworkRequestTimeout)
        );
        fx.monitor.on_complete(&mut fx.requests, id).unwrap();
        assert_eq!(
            fx.monitor.on_grace_expired(LifecycleState::Stored, &fx.requests),
            MonitorVerdict::Continue
        );
    }

    #[test]
    fn test_unknown_request() {
        let mut fx = Fixture::new(10);
        let result = fx.monitor.on_complete(&mut fx.requests, RequestId::new());
        assert!(matches!(result, Err(CacheError::RequestNotFound(_))));
    }
}
