//! Whole-book offline persistence.
//!
//! When a book opens with its full payload, every page and media asset is
//! pushed into the durable cache. Failures are per item: a broken asset URL
//! is logged and reported, and the remaining pages and assets are still
//! cached.

use crate::config::LogLevel;
use crate::durable::{CacheHandle, CachedResponse};
use crate::network::{Fetcher, parse_url};
use crate::telemetry::Telemetry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ts_rs::TS;

static PAGE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/book/(?P<book>[^/]+)/page/(?P<index>\d+)$").expect("static page-key regex")
});

/// Everything needed to read a book without the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineBookPayload {
    pub book_id: String,
    pub title: String,
    pub pages: Vec<String>,
    #[serde(default)]
    pub media: Vec<String>,
}

impl OfflineBookPayload {
    pub fn total_pages(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }
}

/// Durable-cache key for the page at zero-based `index`.
pub fn page_key(book_id: &str, index: usize) -> String {
    format!("/book/{book_id}/page/{index}")
}

pub fn parse_page_key(key: &str) -> Option<(String, usize)> {
    let captures = PAGE_KEY_RE.captures(key)?;
    let index = captures.name("index")?.as_str().parse().ok()?;
    Some((captures.name("book")?.as_str().to_string(), index))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CacheFailure {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct OfflineCacheReport {
    pub book_id: String,
    pub pages_cached: usize,
    pub assets_cached: usize,
    pub failures: Vec<CacheFailure>,
}

impl OfflineCacheReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best-effort copy of a whole book into the durable cache.
pub async fn cache_whole_book(
    payload: &OfflineBookPayload,
    cache: &dyn CacheHandle,
    fetcher: &dyn Fetcher,
) -> OfflineCacheReport {
    let mut report = OfflineCacheReport {
        book_id: payload.book_id.clone(),
        ..OfflineCacheReport::default()
    };

    for (index, page) in payload.pages.iter().enumerate() {
        let key = page_key(&payload.book_id, index);
        match cache.put(&key, CachedResponse::text(key.as_str(), page.as_str())).await {
            Ok(()) => report.pages_cached += 1,
            Err(err) => {
                warn!(key = %key, "Failed to cache page: {err}");
                report.failures.push(CacheFailure {
                    key,
                    message: err.to_string(),
                });
            }
        }
    }

    for url in &payload.media {
        match cache_asset(url, cache, fetcher).await {
            Ok(()) => report.assets_cached += 1,
            Err(message) => {
                warn!(url = %url, "Failed to cache media asset: {message}");
                report.failures.push(CacheFailure {
                    key: url.clone(),
                    message,
                });
            }
        }
    }

    info!(
        book_id = %payload.book_id,
        pages = report.pages_cached,
        assets = report.assets_cached,
        failures = report.failures.len(),
        "Cached book for offline use"
    );
    report
}

async fn cache_asset(url: &str, cache: &dyn CacheHandle, fetcher: &dyn Fetcher) -> Result<(), String> {
    parse_url(url).map_err(|err| err.to_string())?;
    let resource = fetcher.fetch(url).await.map_err(|err| err.to_string())?;
    let response = CachedResponse::new(url, resource.content_type, resource.body);
    cache.put(url, response).await.map_err(|err| err.to_string())
}

/// Zero-based page indices of `book_id` currently held in the durable cache.
pub async fn cached_page_indices(cache: &dyn CacheHandle, book_id: &str) -> Vec<usize> {
    let keys = match cache.keys().await {
        Ok(keys) => keys,
        Err(err) => {
            warn!(book_id, "Failed to list durable cache keys: {err}");
            return Vec::new();
        }
    };
    let mut indices: Vec<usize> = keys
        .iter()
        .filter_map(|key| parse_page_key(key))
        .filter(|(book, _)| book == book_id)
        .map(|(_, index)| index)
        .collect();
    indices.sort_unstable();
    indices
}

/// Hook fired once per session when a book opens with its full payload.
#[derive(Clone)]
pub struct OfflineBridge {
    cache: Arc<dyn CacheHandle>,
    fetcher: Arc<dyn Fetcher>,
    telemetry: Option<Arc<Telemetry>>,
}

impl OfflineBridge {
    pub fn new(cache: Arc<dyn CacheHandle>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache,
            fetcher,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheHandle> {
        &self.cache
    }

    /// Cache the book in the background; the returned handle resolves to the
    /// report once every page and asset has been attempted.
    pub fn on_book_open(&self, payload: OfflineBookPayload) -> JoinHandle<OfflineCacheReport> {
        let bridge = self.clone();
        tokio::spawn(async move {
            if let Some(telemetry) = &bridge.telemetry {
                telemetry.mark(format!("offline:{}", payload.book_id));
            }
            let report = cache_whole_book(&payload, bridge.cache.as_ref(), bridge.fetcher.as_ref()).await;
            if let Some(telemetry) = &bridge.telemetry {
                let level = if report.is_complete() {
                    LogLevel::Info
                } else {
                    LogLevel::Warn
                };
                telemetry.log(
                    level,
                    "offline",
                    "Book cached for offline reading",
                    serde_json::to_value(&report).ok(),
                );
                telemetry.measure(
                    "offline-cache",
                    &format!("offline:{}", payload.book_id),
                    None,
                );
                telemetry.clear_mark(&format!("offline:{}", payload.book_id));
            }
            report
        })
    }
}
