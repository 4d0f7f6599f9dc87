use crate::core::FrameId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Reasons registered by subsystems outside the page (device access,
/// pickers, media session) that make a frame unfit for caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    MediaDevicesDispatcherHost,
    WebBluetooth,
    WebUsb,
    Serial,
    FileChooser,
    MediaSessionService,
    ScreenReader,
    Unknown,
}

impl std::fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DisabledReason::MediaDevicesDispatcherHost => "media-devices-dispatcher-host",
            DisabledReason::WebBluetooth => "web-bluetooth",
            DisabledReason::WebUsb => "web-usb",
            DisabledReason::Serial => "serial",
            DisabledReason::FileChooser => "file-chooser",
            DisabledReason::MediaSessionService => "media-session-service",
            DisabledReason::ScreenReader => "screen-reader",
            DisabledReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Registration traffic from external subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DisableMessage {
    Register { frame: FrameId, reason: DisabledReason },
    Unregister { frame: FrameId, reason: DisabledReason },
}

/// `(frame, reason) -> registration count` table.
///
/// Subsystems only talk to it through [`DisableMessage`]s; the evaluator
/// only reads it.
#[derive(Debug, Default)]
pub struct DisabledReasonRegistry {
    entries: HashMap<FrameId, BTreeMap<DisabledReason, u32>>,
}

impl DisabledReasonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a message; returns true when the reason is present afterwards
    pub fn apply(&mut self, message: DisableMessage) -> bool {
        match message {
            DisableMessage::Register { frame, reason } => {
                *self.entries.entry(frame).or_default().entry(reason).or_insert(0) += 1;
                true
            }
            DisableMessage::Unregister { frame, reason } => {
                let Some(reasons) = self.entries.get_mut(&frame) else {
                    return false;
                };
                if let Some(count) = reasons.get_mut(&reason) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        reasons.remove(&reason);
                    }
                }
                let present = reasons.contains_key(&reason);
                if reasons.is_empty() {
                    self.entries.remove(&frame);
                }
                present
            }
        }
    }

    pub fn reasons_for(&self, frame: FrameId) -> Vec<DisabledReason> {
        self.entries
            .get(&frame)
            .map(|reasons| reasons.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_disabled(&self, frame: FrameId) -> bool {
        self.entries.contains_key(&frame)
    }

    pub fn remove_frames<'a>(&mut self, frames: impl IntoIterator<Item = &'a FrameId>) {
        for id in frames {
            self.entries.remove(id);
        }
    }
}
