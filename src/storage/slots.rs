use super::entry::CachedPageEntry;
use crate::core::{CacheError, CacheIdentity, Origin, PageId, ProcessId, Result};
use lru::LruCache;
use std::num::NonZeroUsize;

/// Fixed-capacity store of cached pages, keyed by [`CacheIdentity`].
///
/// Backed by an `LruCache` that is only ever read with `peek`, so the
/// recency order it keeps is the insertion order: the least recently used
/// entry is always the one stored first.
pub struct StorageSlotManager {
    slots: LruCache<CacheIdentity, CachedPageEntry>,
}

impl StorageSlotManager {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.cap().get()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Would `entry` be accepted?
    ///
    /// Rejects a second entry with the same identity, and a page that would
    /// share a renderer process with a stored page of another site.
    pub fn check_insertable(&self, entry: &CachedPageEntry) -> Result<()> {
        if self.slots.contains(entry.identity()) {
            return Err(CacheError::DuplicateIdentity(*entry.identity()));
        }

        let site = entry.site();
        let processes = entry.processes();
        for (identity, stored) in self.slots.iter() {
            let shares_process = stored.processes().iter().any(|p| processes.contains(p));
            if !shares_process {
                continue;
            }
            let same_site = matches!((&site, stored.site()), (Some(a), Some(b)) if *a == b);
            if !same_site {
                return Err(CacheError::IsolationViolation(format!(
                    "{} ({}) shares a renderer process with {} ({})",
                    entry.identity(),
                    entry.url(),
                    identity,
                    stored.url()
                )));
            }
        }
        Ok(())
    }

    /// Insert `entry`. When every slot is taken the oldest entry is removed
    /// and handed back; the caller evicts it.
    pub fn try_store(&mut self, entry: CachedPageEntry) -> Result<Option<CachedPageEntry>> {
        self.check_insertable(&entry)?;

        let displaced = if self.slots.len() >= self.capacity() {
            self.slots.pop_lru().map(|(_, oldest)| oldest)
        } else {
            None
        };
        self.slots.put(*entry.identity(), entry);
        Ok(displaced)
    }

    pub fn lookup(&self, identity: &CacheIdentity) -> Option<&CachedPageEntry> {
        self.slots.peek(identity)
    }

    pub fn lookup_mut(&mut self, identity: &CacheIdentity) -> Option<&mut CachedPageEntry> {
        self.slots.peek_mut(identity)
    }

    pub fn take(&mut self, identity: &CacheIdentity) -> Option<CachedPageEntry> {
        self.slots.pop(identity)
    }

    pub fn contains(&self, identity: &CacheIdentity) -> bool {
        self.slots.contains(identity)
    }

    pub fn find_by_page(&self, page: PageId) -> Option<CacheIdentity> {
        self.slots
            .iter()
            .find(|(identity, _)| identity.page == page)
            .map(|(identity, _)| *identity)
    }

    pub fn identities_in_process(&self, process: ProcessId) -> Vec<CacheIdentity> {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.uses_process(process))
            .map(|(identity, _)| *identity)
            .collect()
    }

    pub fn identities_with_origin(&self, origin: &Origin) -> Vec<CacheIdentity> {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.origin().same_origin(origin))
            .map(|(identity, _)| *identity)
            .collect()
    }

    /// Stored identities, oldest first
    pub fn identities(&self) -> Vec<CacheIdentity> {
        let mut identities: Vec<CacheIdentity> = self.slots.iter().map(|(id, _)| *id).collect();
        identities.reverse();
        identities
    }
}
