use crate::core::{CacheError, Result};
use crate::eligibility::NoStorePolicy;
use crate::features::Feature;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Back/forward cache configuration
///
/// Built with chained setters or loaded from JSON. Durations are kept in
/// milliseconds so the JSON form stays flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off every page gets `BackForwardCacheDisabled`
    pub enabled: bool,

    /// Maximum number of stored pages
    pub cache_size: usize,

    /// How long a page may stay stored before it is evicted with `Timeout`
    pub time_to_live_ms: u64,

    /// Ceiling on body bytes buffered for frozen pages, per renderer process
    pub max_buffered_bytes_per_process: u64,

    /// How long a frozen page's requests may keep loading
    pub grace_period_to_finish_loading_ms: u64,

    /// How long the renderer may take to acknowledge each freeze event
    pub freeze_ack_timeout_ms: u64,

    pub no_store_policy: NoStorePolicy,

    /// Blocking features that are allowed anyway
    pub allowed_features: BTreeSet<Feature>,

    /// URL prefixes that are never cached
    pub blocked_websites: Vec<String>,

    /// How many pages' not-restored reasons are remembered for a later
    /// history navigation
    pub reason_history_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_size: 6,
            time_to_live_ms: 600_000,
            max_buffered_bytes_per_process: 1_000 * 1024,
            grace_period_to_finish_loading_ms: 5_000,
            freeze_ack_timeout_ms: 3_000,
            no_store_policy: NoStorePolicy::Disabled,
            allowed_features: BTreeSet::new(),
            blocked_websites: Vec::new(),
            reason_history_size: 50,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the number of pages that can be stored at once
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live_ms = duration_ms(ttl);
        self
    }

    pub fn max_buffered_bytes_per_process(mut self, bytes: u64) -> Self {
        self.max_buffered_bytes_per_process = bytes;
        self
    }

    pub fn grace_period_to_finish_loading(mut self, grace: Duration) -> Self {
        self.grace_period_to_finish_loading_ms = duration_ms(grace);
        self
    }

    pub fn freeze_ack_timeout(mut self, timeout: Duration) -> Self {
        self.freeze_ack_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn no_store_policy(mut self, policy: NoStorePolicy) -> Self {
        self.no_store_policy = policy;
        self
    }

    pub fn allow_feature(mut self, feature: Feature) -> Self {
        self.allowed_features.insert(feature);
        self
    }

    pub fn block_website(mut self, prefix: &str) -> Self {
        self.blocked_websites.push(prefix.to_string());
        self
    }

    pub fn reason_history_size(mut self, size: usize) -> Self {
        self.reason_history_size = size;
        self
    }

    pub fn time_to_live_duration(&self) -> Duration {
        Duration::from_millis(self.time_to_live_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_to_finish_loading_ms)
    }

    pub fn freeze_ack_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.freeze_ack_timeout_ms)
    }

    /// Whether `url` falls under one of the blocked website prefixes.
    ///
    /// Matches on host and path prefix, ignoring scheme and port.
    pub fn is_blocked(&self, url: &str) -> bool {
        let Ok(target) = Url::parse(url) else {
            return false;
        };
        self.blocked_websites.iter().any(|prefix| {
            let Ok(blocked) = Url::parse(prefix.trim()) else {
                return false;
            };
            blocked.host_str() == target.host_str() && target.path().starts_with(blocked.path())
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(CacheError::InvalidConfig(
                "cache_size must be greater than 0".into(),
            ));
        }
        if self.max_buffered_bytes_per_process == 0 {
            return Err(CacheError::InvalidConfig(
                "max_buffered_bytes_per_process must be greater than 0".into(),
            ));
        }
        if self.reason_history_size == 0 {
            return Err(CacheError::InvalidConfig(
                "reason_history_size must be greater than 0".into(),
            ));
        }
        if self.grace_period_to_finish_loading_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "grace_period_to_finish_loading_ms must be greater than 0".into(),
            ));
        }
        if self.time_to_live_ms < self.grace_period_to_finish_loading_ms {
            warn!(
                "time_to_live_ms ({}) is shorter than the loading grace period ({}); \
                 pages will expire before their requests time out",
                self.time_to_live_ms, self.grace_period_to_finish_loading_ms
            );
        }
        for prefix in &self.blocked_websites {
            if Url::parse(prefix.trim()).is_err() {
                warn!("ignoring unparsable blocked website '{}'", prefix);
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CacheError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.cache_size, 6);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .cache_size(1)
            .max_buffered_bytes_per_process(10_000)
            .no_store_policy(NoStorePolicy::StoreAndEvict)
            .allow_feature(Feature::BroadcastChannel);
        assert_eq!(config.cache_size, 1);
        assert_eq!(config.max_buffered_bytes_per_process, 10_000);
        assert!(config.allowed_features.contains(&Feature::BroadcastChannel));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig::new().cache_size(0);
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));

        let config = CacheConfig::new().reason_history_size(0);
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = CacheConfig::new().time_to_live(Duration::MAX);
        assert_eq!(config.time_to_live_ms, u64::MAX);
        assert_eq!(duration_ms(Duration::from_secs(5)), 5_000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = CacheConfig::from_json(
            r#"{"cache_size": 2, "no_store_policy": "restore-unless-cookie-change"}"#,
        )
        .unwrap();
        assert_eq!(config.cache_size, 2);
        assert_eq!(config.no_store_policy, NoStorePolicy::RestoreUnlessCookieChange);
        assert_eq!(config.time_to_live_ms, 600_000);
    }

    #[test]
    fn test_blocked_websites_match_host_and_path() {
        let config = CacheConfig::new()
            .block_website("https://a.blocked/")
            .block_website("https://c.com/private");
        assert!(config.is_blocked("https://a.blocked/back_forward_cache/x.html"));
        assert!(config.is_blocked("http://c.com/private/page"));
        assert!(!config.is_blocked("https://c.com/public"));
        assert!(!config.is_blocked("https://a.allowed/"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bfcache.json");
        std::fs::write(&path, r#"{"enabled": false}"#).unwrap();
        let config = CacheConfig::from_file(&path).unwrap();
        assert!(!config.enabled);

        assert!(CacheConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
