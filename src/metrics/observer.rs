use crate::core::{NotRestoredReason, PageId, ReasonSet};
use crate::eligibility::PageVisibleReasons;
use crate::eviction::EvictionRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reasons", rename_all = "snake_case")]
pub enum HistoryNavigationOutcome {
    Restored,
    NotRestored(ReasonSet),
}

impl HistoryNavigationOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, HistoryNavigationOutcome::Restored)
    }
}

/// One reported history navigation
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub page: PageId,
    pub url: String,
    pub outcome: HistoryNavigationOutcome,
    /// What the page itself gets to see; absent on restore
    pub page_visible: Option<PageVisibleReasons>,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(page: PageId, url: impl Into<String>, outcome: HistoryNavigationOutcome) -> Self {
        Self {
            page,
            url: url.into(),
            outcome,
            page_visible: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_page_visible(mut self, visible: PageVisibleReasons) -> Self {
        self.page_visible = Some(visible);
        self
    }
}

/// Receives navigation outcomes. Implementations must not block.
pub trait OutcomeObserver: Send + Sync {
    fn on_outcome(&self, record: &OutcomeRecord);

    fn on_eviction(&self, _record: &EvictionRecord) {}
}

/// Aggregate counters kept by the bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub restored: u64,
    pub not_restored: u64,
    pub evictions: u64,
    /// Not-restored outcomes per reason name
    pub reasons: BTreeMap<String, u64>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.restored + self.not_restored;
        if total == 0 {
            0.0
        } else {
            self.restored as f64 / total as f64
        }
    }

    pub fn count(&self, reason: NotRestoredReason) -> u64 {
        self.reasons.get(reason.as_str()).copied().unwrap_or(0)
    }
}

/// Fans outcomes out to observers and keeps running totals
#[derive(Default)]
pub struct MetricsObserverBridge {
    observers: Vec<Arc<dyn OutcomeObserver>>,
    stats: Mutex<CacheStats>,
}

impl MetricsObserverBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn OutcomeObserver>) {
        self.observers.push(observer);
    }

    pub fn report(&self, record: OutcomeRecord) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
            match &record.outcome {
                HistoryNavigationOutcome::Restored => stats.restored += 1,
                HistoryNavigationOutcome::NotRestored(reasons) => {
                    stats.not_restored += 1;
                    for kind in reasons.kinds() {
                        *stats.reasons.entry(kind.as_str().to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        for observer in &self.observers {
            observer.on_outcome(&record);
        }
    }

    pub fn report_eviction(&self, record: &EvictionRecord) {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).evictions += 1;
        for observer in &self.observers {
            observer.on_eviction(record);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Keeps every record; handy for tests and the simulator
#[derive(Debug, Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<OutcomeRecord>>,
    evictions: Mutex<Vec<EvictionRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn evictions(&self) -> Vec<EvictionRecord> {
        self.evictions.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl OutcomeObserver for RecordingObserver {
    fn on_outcome(&self, record: &OutcomeRecord) {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
    }

    fn on_eviction(&self, record: &EvictionRecord) {
        self.evictions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
    }
}

/// Writes outcomes to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl OutcomeObserver for TracingObserver {
    fn on_outcome(&self, record: &OutcomeRecord) {
        match &record.outcome {
            HistoryNavigationOutcome::Restored => {
                event!(Level::INFO, page = %record.page, url = %record.url, "restored from back/forward cache");
            }
            HistoryNavigationOutcome::NotRestored(reasons) => {
                event!(
                    Level::INFO,
                    page = %record.page,
                    url = %record.url,
                    reasons = %reasons,
                    "not restored from back/forward cache"
                );
            }
        }
    }

    fn on_eviction(&self, record: &EvictionRecord) {
        event!(Level::DEBUG, identity = %record.identity, reasons = %record.reasons, "evicted");
    }
}
