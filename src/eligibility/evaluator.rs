use super::disabled::DisabledReasonRegistry;
use super::frame::{FrameSnapshot, PageSnapshot};
use super::no_store::CookieModifications;
use super::reason_tree::{ReasonNode, ReasonTree};
use crate::config::CacheConfig;
use crate::core::{NotRestoredReason, Origin, Reason, ShouldSwapBrowsingInstance};
use crate::features::FeatureUsageTable;

/// When in the store sequence an evaluation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPhase {
    /// At navigation-away time, before pagehide. Non-sticky features are
    /// not counted: the page may still release them in its handlers.
    BeforeFreeze,
    /// After the renderer acknowledged the freeze sequence
    AfterFreeze,
}

impl EvaluationPhase {
    fn counts_non_sticky(&self) -> bool {
        matches!(self, EvaluationPhase::AfterFreeze)
    }
}

/// Aggregates every source of NotRestoredReasons for a page.
///
/// Synchronous and side-effect free; it only reads the state it borrows.
pub struct EligibilityEvaluator<'a> {
    features: &'a FeatureUsageTable,
    disabled: &'a DisabledReasonRegistry,
    config: &'a CacheConfig,
}

impl<'a> EligibilityEvaluator<'a> {
    pub fn new(
        features: &'a FeatureUsageTable,
        disabled: &'a DisabledReasonRegistry,
        config: &'a CacheConfig,
    ) -> Self {
        Self {
            features,
            disabled,
            config,
        }
    }

    pub fn evaluate(&self, page: &PageSnapshot, phase: EvaluationPhase) -> ReasonTree {
        let root_origin = page.root.origin();
        let mut root = self.evaluate_frame(&page.root, &root_origin, phase, true);

        if !self.config.enabled {
            root.reasons.insert(NotRestoredReason::BackForwardCacheDisabled);
        }
        if self.config.is_blocked(&page.root.url) {
            root.reasons.insert(NotRestoredReason::DomainNotAllowed);
        }
        if !root_origin.is_http_or_https() {
            root.reasons.insert(NotRestoredReason::SchemeNotHttpOrHttps);
        }

        let response = &page.root.response;
        if !response.has_response_head {
            root.reasons.insert(NotRestoredReason::NoResponseHead);
        } else if response.status.is_some_and(|s| s != 200) {
            root.reasons.insert(NotRestoredReason::HttpStatusNotOk);
        }
        if response.is_error_document {
            root.reasons.insert(NotRestoredReason::ErrorDocument);
        }
        if response.cache_control_no_store && !self.config.no_store_policy.allows_storing() {
            root.reasons.insert(NotRestoredReason::CacheControlNoStore);
        }

        if page.related_active_contents > 0 {
            root.reasons.insert(NotRestoredReason::RelatedActiveContentsExist);
            root.reasons.insert(Reason::not_swapped(
                ShouldSwapBrowsingInstance::NoHasRelatedActiveContents,
            ));
        }

        let mut tree = ReasonTree::new(root);
        // A no-store page that is blocked anyway also reports what its
        // policy would have held against it at restore time
        if response.cache_control_no_store
            && self.config.no_store_policy.allows_storing()
            && !tree.is_empty()
        {
            let blockers = self
                .config
                .no_store_policy
                .restore_blockers(&CookieModifications::default());
            tree.add_root_reasons(&blockers);
        }
        tree
    }

    fn evaluate_frame(
        &self,
        frame: &FrameSnapshot,
        root_origin: &Origin,
        phase: EvaluationPhase,
        is_root: bool,
    ) -> ReasonNode {
        let same_origin = is_root || frame.origin().same_origin(root_origin);
        let mut node = ReasonNode::for_frame(frame, same_origin);

        if frame.is_loading {
            node.reasons.insert(NotRestoredReason::Loading);
            if !is_root {
                node.reasons.insert(NotRestoredReason::SubframeIsNavigating);
            }
        }

        if let Some(usage) = self.features.get(frame.id) {
            for feature in usage.blocking(phase.counts_non_sticky(), &self.config.allowed_features) {
                node.reasons.insert(Reason::feature(feature));
            }
        }

        for reason in self.disabled.reasons_for(frame.id) {
            node.reasons.insert(Reason::disabled(reason));
        }

        node.children = frame
            .children
            .iter()
            .map(|child| self.evaluate_frame(child, root_origin, phase, false))
            .collect();
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProcessId;
    use crate::eligibility::{DisableMessage, DisabledReason, NoStorePolicy};
    use crate::features::Feature;

    struct Fixture {
        features: FeatureUsageTable,
        disabled: DisabledReasonRegistry,
        config: CacheConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                features: FeatureUsageTable::new(),
                disabled: DisabledReasonRegistry::new(),
                config: CacheConfig::default(),
            }
        }

        fn evaluate(&self, page: &PageSnapshot, phase: EvaluationPhase) -> ReasonTree {
            EligibilityEvaluator::new(&self.features, &self.disabled, &self.config)
                .evaluate(page, phase)
        }
    }

    fn simple_page(url: &str) -> PageSnapshot {
        PageSnapshot::new(FrameSnapshot::new(url, ProcessId::new()))
    }

    #[test]
    fn test_clean_page_is_eligible() {
        let fx = Fixture::new();
        let tree = fx.evaluate(&simple_page("https://a.com/title1.html"), EvaluationPhase::AfterFreeze);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_http_status_and_response_head() {
        let fx = Fixture::new();
        let page = PageSnapshot::new(
            FrameSnapshot::new("https://a.com/404", ProcessId::new()).with_status(404),
        );
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains_kind(NotRestoredReason::HttpStatusNotOk));

        let mut page = simple_page("https://a.com/");
        page.root.response.has_response_head = false;
        page.root.response.is_error_document = true;
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains_kind(NotRestoredReason::NoResponseHead));
        assert!(flat.contains_kind(NotRestoredReason::ErrorDocument));
        assert!(!flat.contains_kind(NotRestoredReason::HttpStatusNotOk));
    }

    #[test]
    fn test_subframe_loading_reported_at_subframe() {
        let fx = Fixture::new();
        let p = ProcessId::new();
        let child = FrameSnapshot::new("https://a.com/slow", p).loading();
        let child_id = child.id;
        let page = PageSnapshot::new(FrameSnapshot::new("https://a.com/", p).with_child(child));

        let tree = fx.evaluate(&page, EvaluationPhase::BeforeFreeze);
        assert!(tree.root().reasons.is_empty());
        let node = tree.node(child_id).unwrap();
        assert!(node.reasons.contains_kind(NotRestoredReason::Loading));
        assert!(node.reasons.contains_kind(NotRestoredReason::SubframeIsNavigating));
        assert!(tree.flatten().contains_kind(NotRestoredReason::SubframeIsNavigating));
    }

    #[test]
    fn test_related_active_contents_blocks_swap() {
        let fx = Fixture::new();
        let page = simple_page("https://a.com/").with_related_contents(1);
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains_kind(NotRestoredReason::RelatedActiveContentsExist));
        assert!(flat.contains(&Reason::not_swapped(
            ShouldSwapBrowsingInstance::NoHasRelatedActiveContents
        )));
    }

    #[test]
    fn test_non_sticky_feature_only_counts_after_freeze() {
        let mut fx = Fixture::new();
        let page = simple_page("https://a.com/");
        fx.features.started(page.root.id, Feature::BroadcastChannel);

        assert!(fx.evaluate(&page, EvaluationPhase::BeforeFreeze).is_empty());
        let flat = fx.evaluate(&page, EvaluationPhase::AfterFreeze).flatten();
        assert!(flat.contains(&Reason::feature(Feature::BroadcastChannel)));
    }

    #[test]
    fn test_sticky_feature_counts_before_freeze() {
        let mut fx = Fixture::new();
        let page = simple_page("https://a.com/");
        fx.features.started(page.root.id, Feature::WebHid);
        fx.features.stopped(page.root.id, Feature::WebHid);
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains(&Reason::feature(Feature::WebHid)));
    }

    #[test]
    fn test_disabled_reason_on_subframe() {
        let mut fx = Fixture::new();
        let p = ProcessId::new();
        let child = FrameSnapshot::new("https://b.com/", p);
        let child_id = child.id;
        let page = PageSnapshot::new(FrameSnapshot::new("https://a.com/", p).with_child(child));
        fx.disabled.apply(DisableMessage::Register {
            frame: child_id,
            reason: DisabledReason::MediaDevicesDispatcherHost,
        });

        let tree = fx.evaluate(&page, EvaluationPhase::BeforeFreeze);
        let node = tree.node(child_id).unwrap();
        assert!(!node.same_origin_with_root);
        assert!(node.reasons.contains(&Reason::disabled(
            DisabledReason::MediaDevicesDispatcherHost
        )));

        let visible = tree.to_page_visible();
        assert!(visible.children[0].blocked);
        assert!(visible.children[0].reasons.is_empty());
    }

    #[test]
    fn test_no_store_depends_on_policy() {
        let mut fx = Fixture::new();
        let page = PageSnapshot::new(FrameSnapshot::new("https://a.com/", ProcessId::new()).no_store());
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains_kind(NotRestoredReason::CacheControlNoStore));

        fx.config.no_store_policy = NoStorePolicy::StoreAndEvict;
        assert!(fx.evaluate(&page, EvaluationPhase::BeforeFreeze).is_empty());
    }

    #[test]
    fn test_blocked_no_store_page_keeps_no_store_reason() {
        let mut fx = Fixture::new();
        fx.config.no_store_policy = NoStorePolicy::StoreAndEvict;
        let page = PageSnapshot::new(FrameSnapshot::new("https://a.com/", ProcessId::new()).no_store());
        fx.features.started(page.root.id, Feature::WebHid);

        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(flat.contains(&Reason::feature(Feature::WebHid)));
        assert!(flat.contains_kind(NotRestoredReason::CacheControlNoStore));

        fx.config.no_store_policy = NoStorePolicy::RestoreUnlessCookieChange;
        let flat = fx.evaluate(&page, EvaluationPhase::BeforeFreeze).flatten();
        assert!(!flat.contains_kind(NotRestoredReason::CacheControlNoStore));
    }

    #[test]
    fn test_subframe_no_store_is_ignored() {
        let fx = Fixture::new();
        let p = ProcessId::new();
        let page = PageSnapshot::new(
            FrameSnapshot::new("https://a.com/", p)
                .with_child(FrameSnapshot::new("https://a.com/iframe", p).no_store()),
        );
        assert!(fx.evaluate(&page, EvaluationPhase::AfterFreeze).is_empty());
    }

    #[test]
    fn test_engine_level_reasons() {
        let mut fx = Fixture::new();
        fx.config = CacheConfig::new().enabled(false).block_website("https://a.blocked/");
        let flat = fx
            .evaluate(&simple_page("https://a.blocked/page"), EvaluationPhase::BeforeFreeze)
            .flatten();
        assert!(flat.contains_kind(NotRestoredReason::BackForwardCacheDisabled));
        assert!(flat.contains_kind(NotRestoredReason::DomainNotAllowed));

        let flat = Fixture::new()
            .evaluate(&simple_page("file:///tmp/page.html"), EvaluationPhase::BeforeFreeze)
            .flatten();
        assert!(flat.contains_kind(NotRestoredReason::SchemeNotHttpOrHttps));
    }
}
