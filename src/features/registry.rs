use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BroadcastChannel,
    WebSocket,
    WebTransport,
    WebRtc,
    WebLocks,
    IndexedDbConnection,
    SharedWorker,
    IdleManager,
    SpeechSynthesis,
    WebOtpService,
    SpeechRecognizer,
    KeyboardLock,
    ContainsPlugins,
    WebHid,
    PaymentManager,
    AppBanner,
    RequestedMidiPermission,
    WebDatabase,
}

impl Feature {
    pub const ALL: [Feature; 18] = [
        Feature::BroadcastChannel,
        Feature::WebSocket,
        Feature::WebTransport,
        Feature::WebRtc,
        Feature::WebLocks,
        Feature::IndexedDbConnection,
        Feature::SharedWorker,
        Feature::IdleManager,
        Feature::SpeechSynthesis,
        Feature::WebOtpService,
        Feature::SpeechRecognizer,
        Feature::KeyboardLock,
        Feature::ContainsPlugins,
        Feature::WebHid,
        Feature::PaymentManager,
        Feature::AppBanner,
        Feature::RequestedMidiPermission,
        Feature::WebDatabase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::BroadcastChannel => "broadcastchannel",
            Feature::WebSocket => "websocket",
            Feature::WebTransport => "webtransport",
            Feature::WebRtc => "webrtc",
            Feature::WebLocks => "weblocks",
            Feature::IndexedDbConnection => "indexeddb-connection",
            Feature::SharedWorker => "sharedworker",
            Feature::IdleManager => "idlemanager",
            Feature::SpeechSynthesis => "speechsynthesis",
            Feature::WebOtpService => "webotpservice",
            Feature::SpeechRecognizer => "speechrecognizer",
            Feature::KeyboardLock => "keyboardlock",
            Feature::ContainsPlugins => "plugins",
            Feature::WebHid => "webhid",
            Feature::PaymentManager => "paymentmanager",
            Feature::AppBanner => "appbanner",
            Feature::RequestedMidiPermission => "midi-permission",
            Feature::WebDatabase => "webdatabase",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stickiness {
    /// Once used, blocks the document for the rest of its lifetime
    Sticky,
    /// Blocks only while in use; the page may release it in pagehide/freeze
    NonSticky,
}

/// Static classification of blocking features.
pub struct FeatureFlagRegistry;

impl FeatureFlagRegistry {
    pub const fn classify(feature: Feature) -> Stickiness {
        match feature {
            Feature::SpeechRecognizer
            | Feature::KeyboardLock
            | Feature::ContainsPlugins
            | Feature::WebHid
            | Feature::PaymentManager
            | Feature::AppBanner
            | Feature::RequestedMidiPermission
            | Feature::WebDatabase => Stickiness::Sticky,
            Feature::BroadcastChannel
            | Feature::WebSocket
            | Feature::WebTransport
            | Feature::WebRtc
            | Feature::WebLocks
            | Feature::IndexedDbConnection
            | Feature::SharedWorker
            | Feature::IdleManager
            | Feature::SpeechSynthesis
            | Feature::WebOtpService => Stickiness::NonSticky,
        }
    }

    pub const fn is_sticky(feature: Feature) -> bool {
        matches!(Self::classify(feature), Stickiness::Sticky)
    }

    pub fn sticky_features() -> impl Iterator<Item = Feature> {
        Feature::ALL.into_iter().filter(|f| Self::is_sticky(*f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            FeatureFlagRegistry::classify(Feature::BroadcastChannel),
            Stickiness::NonSticky
        );
        assert_eq!(
            FeatureFlagRegistry::classify(Feature::KeyboardLock),
            Stickiness::Sticky
        );
        assert!(FeatureFlagRegistry::is_sticky(Feature::ContainsPlugins));
    }

    #[test]
    fn test_every_feature_is_classified_once() {
        let sticky = FeatureFlagRegistry::sticky_features().count();
        let non_sticky = Feature::ALL
            .iter()
            .filter(|f| !FeatureFlagRegistry::is_sticky(**f))
            .count();
        assert_eq!(sticky + non_sticky, Feature::ALL.len());
        assert_eq!(sticky, 8);
    }
}
