//! In-memory page cache owned by a viewer session.
//!
//! Entries are keyed by 1-based page number. Residency is kept to a window
//! around the page the viewer last committed to: `cleanup` drops everything
//! outside the window, and `put` evicts the entry farthest from that anchor
//! when the cache is full.

use crate::cancellation::GenerationToken;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CacheStats {
    pub resident_count: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// True once residency exceeds `ratio` of capacity.
    pub fn under_pressure(&self, ratio: f32) -> bool {
        self.capacity > 0 && self.resident_count as f32 > self.capacity as f32 * ratio
    }
}

#[derive(Debug)]
pub struct PageCache {
    entries: BTreeMap<u32, Arc<str>>,
    capacity: usize,
    anchor: u32,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
            anchor: 1,
        }
    }

    pub fn get(&self, page: u32) -> Option<Arc<str>> {
        self.entries.get(&page).cloned()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.entries.contains_key(&page)
    }

    pub fn put(&mut self, page: u32, payload: impl Into<Arc<str>>) {
        if !self.entries.contains_key(&page) && self.entries.len() >= self.capacity {
            if let Some(victim) = self.farthest_from_anchor() {
                trace!(victim, anchor = self.anchor, "Evicting page to stay within capacity");
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(page, payload.into());
    }

    /// Drop every entry more than `window` pages away from `current_page`.
    /// Returns how many entries were evicted.
    pub fn cleanup(&mut self, current_page: u32, window: u32) -> usize {
        self.anchor = current_page;
        let before = self.entries.len();
        self.entries
            .retain(|page, _| page.abs_diff(current_page) <= window);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(current_page, window, evicted, "Cache cleanup");
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident_count: self.entries.len(),
            capacity: self.capacity,
        }
    }

    pub fn resident_pages(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn farthest_from_anchor(&self) -> Option<u32> {
        let anchor = self.anchor;
        self.entries
            .keys()
            .copied()
            .max_by_key(|page| page.abs_diff(anchor))
    }
}

/// Cloneable handle shared by the session and its preloader.
///
/// Callers only go through `get`/`put`/`cleanup`; the lock is never held
/// across an await point.
#[derive(Debug, Clone)]
pub struct SharedPageCache {
    inner: Arc<Mutex<PageCache>>,
}

impl SharedPageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PageCache::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PageCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, page: u32) -> Option<Arc<str>> {
        self.lock().get(page)
    }

    pub fn contains(&self, page: u32) -> bool {
        self.lock().contains(page)
    }

    pub fn put(&self, page: u32, payload: impl Into<Arc<str>>) {
        self.lock().put(page, payload);
    }

    /// Insert `payload` only while `token` is still current. The check and the
    /// insert happen under one lock, so a cleanup that follows a generation
    /// change can never be undone by a late result. Returns whether the page
    /// was stored.
    pub fn put_current(
        &self,
        page: u32,
        payload: impl Into<Arc<str>>,
        token: &GenerationToken,
    ) -> bool {
        let mut cache = self.lock();
        if token.is_stale() {
            return false;
        }
        cache.put(page, payload);
        true
    }

    pub fn cleanup(&self, current_page: u32, window: u32) -> usize {
        self.lock().cleanup(current_page, window)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn resident_pages(&self) -> Vec<u32> {
        self.lock().resident_pages()
    }

    pub fn dispose(&self) {
        self.lock().clear();
    }
}
