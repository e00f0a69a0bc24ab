//! Background fill of the pages around the current one.
//!
//! Every call to `preload_adjacent` starts a new generation. Earlier
//! generations keep running (their resolver calls are not cancelled) but
//! whatever they produce after being superseded is dropped instead of
//! landing in the cache.

use crate::cache::SharedPageCache;
use crate::cancellation::{GenerationClock, GenerationToken};
use crate::config::LogLevel;
use crate::resolver::PageResolver;
use crate::telemetry::Telemetry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace};

/// Pages within `window` of `current_page`, clamped to the book and ordered
/// nearest first (ahead before behind on ties). The current page is excluded.
pub fn adjacent_pages(current_page: u32, total_pages: u32, window: u32) -> Vec<u32> {
    let mut pages = Vec::new();
    for distance in 1..=window {
        if let Some(ahead) = current_page.checked_add(distance) {
            if ahead <= total_pages {
                pages.push(ahead);
            }
        }
        if let Some(behind) = current_page.checked_sub(distance) {
            if behind >= 1 {
                pages.push(behind);
            }
        }
    }
    pages
}

pub struct Preloader {
    cache: SharedPageCache,
    telemetry: Arc<Telemetry>,
    window: u32,
    clock: GenerationClock,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Preloader {
    pub fn new(cache: SharedPageCache, telemetry: Arc<Telemetry>, window: u32) -> Self {
        Self {
            cache,
            telemetry,
            window,
            clock: GenerationClock::new(),
            inflight: Mutex::new(Vec::new()),
        }
    }

    fn inflight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule resolves for uncached neighbours of `current_page` and return
    /// immediately. Returns how many pages were scheduled.
    pub fn preload_adjacent(
        &self,
        current_page: u32,
        total_pages: u32,
        resolver: &Arc<dyn PageResolver>,
    ) -> usize {
        let token = self.clock.advance();
        let targets: Vec<u32> = adjacent_pages(current_page, total_pages, self.window)
            .into_iter()
            .filter(|page| !self.cache.contains(*page))
            .collect();
        if targets.is_empty() {
            trace!(current_page, "Neighbours already cached");
            return 0;
        }

        let scheduled = targets.len();
        debug!(
            current_page,
            generation = token.generation(),
            pages = ?targets,
            "Preloading adjacent pages"
        );
        let handle = tokio::spawn(run_generation(
            targets,
            token,
            Arc::clone(resolver),
            self.cache.clone(),
            Arc::clone(&self.telemetry),
        ));

        let mut inflight = self.inflight();
        inflight.retain(|task| !task.is_finished());
        inflight.push(handle);
        scheduled
    }

    /// Wait until every scheduled generation has finished.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inflight());
            if pending.is_empty() {
                return;
            }
            for task in pending {
                let _ = task.await;
            }
        }
    }

    /// Make every running generation stale without stopping it. Called
    /// before the cache window moves so no late result lands outside it.
    pub fn invalidate(&self) {
        self.clock.invalidate();
    }

    /// Stop all background work and make any late result stale.
    pub fn abort_all(&self) {
        self.clock.invalidate();
        for task in self.inflight().drain(..) {
            task.abort();
        }
    }
}

async fn run_generation(
    targets: Vec<u32>,
    token: GenerationToken,
    resolver: Arc<dyn PageResolver>,
    cache: SharedPageCache,
    telemetry: Arc<Telemetry>,
) {
    let mark = format!("preload:{}", token.generation());
    telemetry.mark(mark.as_str());

    let mut tasks = JoinSet::new();
    for page in targets {
        let resolver = Arc::clone(&resolver);
        tasks.spawn(async move { (page, resolver.resolve(page).await) });
    }

    let mut filled = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let Ok((page, result)) = joined else {
            continue;
        };
        match result {
            Ok(content) => {
                if !cache.put_current(page, content, &token) {
                    trace!(page, generation = token.generation(), "Discarding stale preload");
                    continue;
                }
                filled += 1;
            }
            Err(err) => {
                telemetry.log(
                    LogLevel::Warn,
                    "preload",
                    "Neighbour page failed to resolve",
                    Some(serde_json::json!({ "page": page, "error": err.message })),
                );
            }
        }
    }

    if token.is_current() {
        telemetry.measure("preload", &mark, None);
    }
    telemetry.clear_mark(&mark);
    debug!(generation = token.generation(), filled, "Preload generation finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::resolver::FnResolver;
    use std::time::Duration;

    fn slow_resolver(delay_ms: u64) -> Arc<dyn PageResolver> {
        Arc::new(FnResolver::new(move |page| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(format!("page {page}"))
        }))
    }

    #[test]
    fn adjacent_pages_stay_inside_the_book() {
        assert_eq!(adjacent_pages(1, 10, 3), vec![2, 3, 4]);
        assert_eq!(adjacent_pages(10, 10, 3), vec![9, 8, 7]);
        assert_eq!(adjacent_pages(5, 10, 2), vec![6, 4, 7, 3]);
        assert!(adjacent_pages(1, 1, 3).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fills_uncached_neighbours_in_the_background() {
        let cache = SharedPageCache::new(20);
        cache.put(1, "page 1");
        cache.put(3, "already here");
        let preloader = Preloader::new(cache.clone(), Arc::new(Telemetry::new(32, true)), 3);

        let scheduled = preloader.preload_adjacent(1, 10, &slow_resolver(50));
        assert_eq!(scheduled, 2);
        assert_eq!(cache.resident_pages(), vec![1, 3]);

        preloader.settle().await;
        assert_eq!(cache.resident_pages(), vec![1, 2, 3, 4]);
        assert_eq!(cache.get(3).as_deref(), Some("already here"));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_generation_results_are_dropped() {
        let cache = SharedPageCache::new(20);
        let preloader = Preloader::new(cache.clone(), Arc::new(Telemetry::new(32, true)), 1);

        preloader.preload_adjacent(2, 20, &slow_resolver(500));
        tokio::time::sleep(Duration::from_millis(10)).await;
        preloader.preload_adjacent(10, 20, &slow_resolver(20));

        preloader.settle().await;
        assert_eq!(cache.resident_pages(), vec![9, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidated_generation_cannot_refill_a_moved_window() {
        let cache = SharedPageCache::new(20);
        let preloader = Preloader::new(cache.clone(), Arc::new(Telemetry::new(32, true)), 2);

        preloader.preload_adjacent(3, 20, &slow_resolver(100));
        tokio::time::sleep(Duration::from_millis(10)).await;
        preloader.invalidate();
        cache.cleanup(15, 2);

        preloader.settle().await;
        assert!(cache.resident_pages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_neighbour_is_logged_and_skipped() {
        let cache = SharedPageCache::new(20);
        let telemetry = Arc::new(Telemetry::new(32, true));
        let preloader = Preloader::new(cache.clone(), telemetry.clone(), 1);
        let resolver: Arc<dyn PageResolver> = Arc::new(FnResolver::new(|page| async move {
            if page == 4 {
                Err(ResolveError::new(page, "404"))
            } else {
                Ok(format!("page {page}"))
            }
        }));

        preloader.preload_adjacent(5, 10, &resolver);
        preloader.settle().await;
        assert_eq!(cache.resident_pages(), vec![6]);
        let warnings = telemetry.records_in("preload");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, LogLevel::Warn);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_all_leaves_the_cache_untouched() {
        let cache = SharedPageCache::new(20);
        let preloader = Preloader::new(cache.clone(), Arc::new(Telemetry::new(8, true)), 2);
        preloader.preload_adjacent(1, 10, &slow_resolver(100));
        preloader.abort_all();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.resident_pages().is_empty());
    }
}
