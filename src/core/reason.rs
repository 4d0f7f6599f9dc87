// ============================================================================
// NotRestoredReason
// ============================================================================
//
// Why a page was not (or could not be) served from the back/forward cache.
// A reason is a tagged kind plus an optional payload naming the feature,
// disabled reason or browsing-instance swap decision involved. Reasons are
// collected in a ReasonSet, which has set semantics and never shrinks.
//
// ============================================================================

use crate::eligibility::DisabledReason;
use crate::features::Feature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotRestoredReason {
    Loading,
    SubframeIsNavigating,
    HttpStatusNotOk,
    NoResponseHead,
    ErrorDocument,
    SchemeNotHttpOrHttps,
    RelatedActiveContentsExist,
    BrowsingInstanceNotSwapped,
    BlocklistedFeatures,
    DisableForRenderFrameHostCalled,
    CacheControlNoStore,
    CacheControlNoStoreCookieModified,
    CacheControlNoStoreHttpOnlyCookieModified,
    JavaScriptExecution,
    ServiceWorkerClaim,
    ServiceWorkerUnregistration,
    ServiceWorkerVersionActivation,
    ServiceWorkerPostMessage,
    NetworkExceedsBufferLimit,
    NetworkRequestRedirected,
    NetworkRequestTimeout,
    NetworkRequestDatapipeDrainedAsBytesConsumer,
    Timeout,
    TimeoutPuttingInCache,
    CacheLimit,
    RendererProcessKilled,
    BackForwardCacheDisabled,
    DomainNotAllowed,
}

/// Coarse grouping used by observers and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCategory {
    LoadingState,
    HttpOrNetwork,
    FeatureBlocklist,
    ExternallyDisabled,
    BrowsingInstanceSwap,
    CacheControlNoStore,
    ServiceWorker,
    JavaScriptExecution,
    ResourceLimit,
    Timeout,
    Engine,
}

impl NotRestoredReason {
    pub const ALL: [NotRestoredReason; 28] = [
        NotRestoredReason::Loading,
        NotRestoredReason::SubframeIsNavigating,
        NotRestoredReason::HttpStatusNotOk,
        NotRestoredReason::NoResponseHead,
        NotRestoredReason::ErrorDocument,
        NotRestoredReason::SchemeNotHttpOrHttps,
        NotRestoredReason::RelatedActiveContentsExist,
        NotRestoredReason::BrowsingInstanceNotSwapped,
        NotRestoredReason::BlocklistedFeatures,
        NotRestoredReason::DisableForRenderFrameHostCalled,
        NotRestoredReason::CacheControlNoStore,
        NotRestoredReason::CacheControlNoStoreCookieModified,
        NotRestoredReason::CacheControlNoStoreHttpOnlyCookieModified,
        NotRestoredReason::JavaScriptExecution,
        NotRestoredReason::ServiceWorkerClaim,
        NotRestoredReason::ServiceWorkerUnregistration,
        NotRestoredReason::ServiceWorkerVersionActivation,
        NotRestoredReason::ServiceWorkerPostMessage,
        NotRestoredReason::NetworkExceedsBufferLimit,
        NotRestoredReason::NetworkRequestRedirected,
        NotRestoredReason::NetworkRequestTimeout,
        NotRestoredReason::NetworkRequestDatapipeDrainedAsBytesConsumer,
        NotRestoredReason::Timeout,
        NotRestoredReason::TimeoutPuttingInCache,
        NotRestoredReason::CacheLimit,
        NotRestoredReason::RendererProcessKilled,
        NotRestoredReason::BackForwardCacheDisabled,
        NotRestoredReason::DomainNotAllowed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotRestoredReason::Loading => "loading",
            NotRestoredReason::SubframeIsNavigating => "subframe-is-navigating",
            NotRestoredReason::HttpStatusNotOk => "http-status-not-ok",
            NotRestoredReason::NoResponseHead => "no-response-head",
            NotRestoredReason::ErrorDocument => "error-document",
            NotRestoredReason::SchemeNotHttpOrHttps => "scheme-not-http-or-https",
            NotRestoredReason::RelatedActiveContentsExist => "related-active-contents-exist",
            NotRestoredReason::BrowsingInstanceNotSwapped => "browsing-instance-not-swapped",
            NotRestoredReason::BlocklistedFeatures => "blocklisted-features",
            NotRestoredReason::DisableForRenderFrameHostCalled => {
                "disable-for-render-frame-host-called"
            }
            NotRestoredReason::CacheControlNoStore => "cache-control-no-store",
            NotRestoredReason::CacheControlNoStoreCookieModified => {
                "cache-control-no-store-cookie-modified"
            }
            NotRestoredReason::CacheControlNoStoreHttpOnlyCookieModified => {
                "cache-control-no-store-http-only-cookie-modified"
            }
            NotRestoredReason::JavaScriptExecution => "javascript-execution",
            NotRestoredReason::ServiceWorkerClaim => "service-worker-claim",
            NotRestoredReason::ServiceWorkerUnregistration => "service-worker-unregistration",
            NotRestoredReason::ServiceWorkerVersionActivation => {
                "service-worker-version-activation"
            }
            NotRestoredReason::ServiceWorkerPostMessage => "service-worker-post-message",
            NotRestoredReason::NetworkExceedsBufferLimit => "network-exceeds-buffer-limit",
            NotRestoredReason::NetworkRequestRedirected => "network-request-redirected",
            NotRestoredReason::NetworkRequestTimeout => "network-request-timeout",
            NotRestoredReason::NetworkRequestDatapipeDrainedAsBytesConsumer => {
                "network-request-datapipe-drained-as-bytes-consumer"
            }
            NotRestoredReason::Timeout => "timeout",
            NotRestoredReason::TimeoutPuttingInCache => "timeout-putting-in-cache",
            NotRestoredReason::CacheLimit => "cache-limit",
            NotRestoredReason::RendererProcessKilled => "renderer-process-killed",
            NotRestoredReason::BackForwardCacheDisabled => "back-forward-cache-disabled",
            NotRestoredReason::DomainNotAllowed => "domain-not-allowed",
        }
    }

    pub fn category(&self) -> ReasonCategory {
        use NotRestoredReason::*;
        match self {
            Loading | SubframeIsNavigating => ReasonCategory::LoadingState,
            HttpStatusNotOk | NoResponseHead | ErrorDocument | SchemeNotHttpOrHttps => {
                ReasonCategory::HttpOrNetwork
            }
            RelatedActiveContentsExist | BrowsingInstanceNotSwapped => {
                ReasonCategory::BrowsingInstanceSwap
            }
            BlocklistedFeatures => ReasonCategory::FeatureBlocklist,
            DisableForRenderFrameHostCalled => ReasonCategory::ExternallyDisabled,
            CacheControlNoStore
            | CacheControlNoStoreCookieModified
            | CacheControlNoStoreHttpOnlyCookieModified => ReasonCategory::CacheControlNoStore,
            JavaScriptExecution => ReasonCategory::JavaScriptExecution,
            ServiceWorkerClaim
            | ServiceWorkerUnregistration
            | ServiceWorkerVersionActivation
            | ServiceWorkerPostMessage => ReasonCategory::ServiceWorker,
            NetworkExceedsBufferLimit
            | NetworkRequestRedirected
            | NetworkRequestDatapipeDrainedAsBytesConsumer
            | CacheLimit => ReasonCategory::ResourceLimit,
            NetworkRequestTimeout | Timeout | TimeoutPuttingInCache => ReasonCategory::Timeout,
            RendererProcessKilled | BackForwardCacheDisabled | DomainNotAllowed => {
                ReasonCategory::Engine
            }
        }
    }
}

impl std::fmt::Display for NotRestoredReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the browsing-instance swap decision for a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShouldSwapBrowsingInstance {
    Yes,
    NoHasRelatedActiveContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReasonDetail {
    Feature(Feature),
    Disabled(DisabledReason),
    SwapDecision(ShouldSwapBrowsingInstance),
}

/// A reason kind with its optional payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reason {
    pub kind: NotRestoredReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReasonDetail>,
}

impl Reason {
    pub fn new(kind: NotRestoredReason) -> Self {
        Self { kind, detail: None }
    }

    pub fn feature(feature: Feature) -> Self {
        Self {
            kind: NotRestoredReason::BlocklistedFeatures,
            detail: Some(ReasonDetail::Feature(feature)),
        }
    }

    pub fn disabled(reason: DisabledReason) -> Self {
        Self {
            kind: NotRestoredReason::DisableForRenderFrameHostCalled,
            detail: Some(ReasonDetail::Disabled(reason)),
        }
    }

    pub fn not_swapped(decision: ShouldSwapBrowsingInstance) -> Self {
        Self {
            kind: NotRestoredReason::BrowsingInstanceNotSwapped,
            detail: Some(ReasonDetail::SwapDecision(decision)),
        }
    }
}

impl From<NotRestoredReason> for Reason {
    fn from(kind: NotRestoredReason) -> Self {
        Reason::new(kind)
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            None => write!(f, "{}", self.kind),
            Some(ReasonDetail::Feature(feature)) => write!(f, "{}({})", self.kind, feature),
            Some(ReasonDetail::Disabled(reason)) => write!(f, "{}({})", self.kind, reason),
            Some(ReasonDetail::SwapDecision(decision)) => {
                write!(f, "{}({:?})", self.kind, decision)
            }
        }
    }
}

/// Set of reasons; inserting twice is a no-op and nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonSet(BTreeSet<Reason>);

impl ReasonSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns true if the reason was not already present
    pub fn insert(&mut self, reason: impl Into<Reason>) -> bool {
        self.0.insert(reason.into())
    }

    pub fn merge(&mut self, other: &ReasonSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn union(&self, other: &ReasonSet) -> ReasonSet {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    pub fn contains(&self, reason: &Reason) -> bool {
        self.0.contains(reason)
    }

    pub fn contains_kind(&self, kind: NotRestoredReason) -> bool {
        self.0.iter().any(|r| r.kind == kind)
    }

    /// Distinct kinds, in declaration order
    pub fn kinds(&self) -> Vec<NotRestoredReason> {
        let kinds: BTreeSet<NotRestoredReason> = self.0.iter().map(|r| r.kind).collect();
        kinds.into_iter().collect()
    }

    pub fn features(&self) -> Vec<Feature> {
        self.0
            .iter()
            .filter_map(|r| match r.detail {
                Some(ReasonDetail::Feature(feature)) => Some(feature),
                _ => None,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reason> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Reason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = Reason>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<NotRestoredReason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = NotRestoredReason>>(iter: I) -> Self {
        Self(iter.into_iter().map(Reason::new).collect())
    }
}

impl<'a> IntoIterator for &'a ReasonSet {
    type Item = &'a Reason;
    type IntoIter = std::collections::btree_set::Iter<'a, Reason>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for ReasonSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = ReasonSet::new();
        assert!(set.insert(NotRestoredReason::Loading));
        assert!(!set.insert(NotRestoredReason::Loading));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_payload_distinguishes_reasons() {
        let mut set = ReasonSet::new();
        set.insert(Reason::feature(Feature::BroadcastChannel));
        set.insert(Reason::feature(Feature::WebSocket));
        assert_eq!(set.len(), 2);
        assert_eq!(set.kinds(), vec![NotRestoredReason::BlocklistedFeatures]);
        assert_eq!(set.features(), vec![Feature::BroadcastChannel, Feature::WebSocket]);
    }

    #[test]
    fn test_union_keeps_both_sides() {
        let a: ReasonSet = [NotRestoredReason::CacheControlNoStore].into_iter().collect();
        let b: ReasonSet = [NotRestoredReason::JavaScriptExecution].into_iter().collect();
        let merged = a.union(&b);
        assert!(merged.contains_kind(NotRestoredReason::CacheControlNoStore));
        assert!(merged.contains_kind(NotRestoredReason::JavaScriptExecution));
    }

    #[test]
    fn test_serializes_as_tagged_union() {
        let mut set = ReasonSet::new();
        set.insert(Reason::disabled(DisabledReason::WebBluetooth));
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(
            json,
            r#"[{"kind":"disable_for_render_frame_host_called","detail":{"type":"disabled","value":"web_bluetooth"}}]"#
        );
        let back: ReasonSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_reason_names_are_unique() {
        let names: BTreeSet<&str> = NotRestoredReason::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(names.len(), NotRestoredReason::ALL.len());
    }
}
