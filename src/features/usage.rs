use super::registry::{Feature, FeatureFlagRegistry, Stickiness};
use crate::core::FrameId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Usage state of a single feature within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageState {
    Unused,
    StickyActive,
    NonStickyActive,
}

/// Feature usage reported by the renderer for one frame.
///
/// Sticky usage is never cleared. Non-sticky usage is reference counted so
/// two open WebSockets need two `stopped` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureUsage {
    sticky: BTreeSet<Feature>,
    non_sticky: BTreeMap<Feature, u32>,
}

impl FeatureUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&mut self, feature: Feature) -> UsageState {
        match FeatureFlagRegistry::classify(feature) {
            Stickiness::Sticky => {
                self.sticky.insert(feature);
                UsageState::StickyActive
            }
            Stickiness::NonSticky => {
                *self.non_sticky.entry(feature).or_insert(0) += 1;
                UsageState::NonStickyActive
            }
        }
    }

    pub fn stopped(&mut self, feature: Feature) -> UsageState {
        if FeatureFlagRegistry::is_sticky(feature) {
            return self.state(feature);
        }
        if let Some(count) = self.non_sticky.get_mut(&feature) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.non_sticky.remove(&feature);
            }
        }
        self.state(feature)
    }

    pub fn state(&self, feature: Feature) -> UsageState {
        if self.sticky.contains(&feature) {
            UsageState::StickyActive
        } else if self.non_sticky.contains_key(&feature) {
            UsageState::NonStickyActive
        } else {
            UsageState::Unused
        }
    }

    /// Features that currently block caching.
    ///
    /// Non-sticky usage only counts when `include_non_sticky` is set, i.e.
    /// once the page had its chance to release it in its pagehide handler.
    pub fn blocking(&self, include_non_sticky: bool, allowed: &BTreeSet<Feature>) -> Vec<Feature> {
        let mut out: Vec<Feature> = self
            .sticky
            .iter()
            .filter(|f| !allowed.contains(f))
            .copied()
            .collect();
        if include_non_sticky {
            out.extend(self.non_sticky.keys().filter(|f| !allowed.contains(f)).copied());
        }
        out.sort();
        out
    }

    pub fn has_sticky(&self) -> bool {
        !self.sticky.is_empty()
    }

    pub fn is_unused(&self) -> bool {
        self.sticky.is_empty() && self.non_sticky.is_empty()
    }
}

/// Per-frame usage for every frame the engine knows about
#[derive(Debug, Default)]
pub struct FeatureUsageTable {
    frames: HashMap<FrameId, FeatureUsage>,
}

impl FeatureUsageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&mut self, frame: FrameId, feature: Feature) -> UsageState {
        self.frames.entry(frame).or_default().started(feature)
    }

    pub fn stopped(&mut self, frame: FrameId, feature: Feature) -> UsageState {
        match self.frames.get_mut(&frame) {
            Some(usage) => usage.stopped(feature),
            None => UsageState::Unused,
        }
    }

    pub fn get(&self, frame: FrameId) -> Option<&FeatureUsage> {
        self.frames.get(&frame)
    }

    /// Copy of the usage of the given frames, skipping unused ones
    pub fn snapshot<'a>(
        &self,
        frames: impl IntoIterator<Item = &'a FrameId>,
    ) -> HashMap<FrameId, FeatureUsage> {
        frames
            .into_iter()
            .filter_map(|id| {
                self.frames
                    .get(id)
                    .filter(|usage| !usage.is_unused())
                    .map(|usage| (*id, usage.clone()))
            })
            .collect()
    }

    /// Forget frames whose documents are gone
    pub fn remove_frames<'a>(&mut self, frames: impl IntoIterator<Item = &'a FrameId>) {
        for id in frames {
            self.frames.remove(id);
        }
    }
}
