use crate::core::{NotRestoredReason, ReasonSet};
use serde::{Deserialize, Serialize};

/// Enforcement level for main documents served with `Cache-Control: no-store`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoStorePolicy {
    /// Never store such documents
    #[default]
    Disabled,
    /// Store, but always evict on the next restore attempt
    StoreAndEvict,
    /// Restore unless any cookie of the document's origin changed meanwhile
    RestoreUnlessCookieChange,
    /// Restore unless an HTTP-only cookie of the document's origin changed
    RestoreUnlessHttpOnlyCookieChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieChangeKind {
    /// Visible to script (`document.cookie`)
    Script,
    HttpOnly,
}

/// Cookie changes observed for a stored page's origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieModifications {
    pub script: bool,
    pub http_only: bool,
}

impl CookieModifications {
    pub fn record(&mut self, kind: CookieChangeKind) {
        match kind {
            CookieChangeKind::Script => self.script = true,
            CookieChangeKind::HttpOnly => self.http_only = true,
        }
    }

    pub fn any(&self) -> bool {
        self.script || self.http_only
    }
}

impl NoStorePolicy {
    pub fn allows_storing(&self) -> bool {
        !matches!(self, NoStorePolicy::Disabled)
    }

    /// Reasons that keep a stored no-store page from being restored
    pub fn restore_blockers(&self, cookies: &CookieModifications) -> ReasonSet {
        let mut reasons = ReasonSet::new();
        match self {
            NoStorePolicy::Disabled | NoStorePolicy::StoreAndEvict => {
                reasons.insert(NotRestoredReason::CacheControlNoStore);
            }
            NoStorePolicy::RestoreUnlessCookieChange => {
                if cookies.http_only {
                    reasons.insert(NotRestoredReason::CacheControlNoStoreHttpOnlyCookieModified);
                } else if cookies.script {
                    reasons.insert(NotRestoredReason::CacheControlNoStoreCookieModified);
                }
            }
            NoStorePolicy::RestoreUnlessHttpOnlyCookieChange => {
                if cookies.http_only {
                    reasons.insert(NotRestoredReason::CacheControlNoStoreHttpOnlyCookieModified);
                }
            }
        }
        reasons
    }
}
