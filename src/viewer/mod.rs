//! Viewer session: owns page position, zoom, bookmarks and control
//! visibility, and drives the page cache and preloader on every committed
//! navigation.
//!
//! The session is explicitly constructed and disposed; nothing here is
//! process-global, so several sessions can run side by side.

mod commands;
mod controls;
mod navigation;
mod state;

pub use commands::{ViewerCommand, ViewerEvent};
pub use state::{NavigationRequest, ViewerPhase, ViewerSnapshot};

use crate::cache::{CacheStats, SharedPageCache};
use crate::cancellation::GenerationClock;
use crate::config::{Capabilities, LogLevel, ViewerConfig};
use crate::error::{ViewerError, ViewerResult};
use crate::offline::{OfflineBookPayload, OfflineBridge, OfflineCacheReport};
use crate::preload::Preloader;
use crate::resolver::{BookPagesResolver, PageResolver};
use crate::telemetry::Telemetry;
use state::ViewerState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Default)]
struct SessionTimers {
    debounce: Option<JoinHandle<()>>,
    /// Debounce timers whose request was already taken for commit.
    committing: Vec<JoinHandle<()>>,
    inactivity: Option<JoinHandle<()>>,
    pressure: Option<JoinHandle<()>>,
}

impl SessionTimers {
    fn abort_all(&mut self) {
        for handle in [
            self.debounce.take(),
            self.inactivity.take(),
            self.pressure.take(),
        ]
        .into_iter()
        .flatten()
        .chain(self.committing.drain(..))
        {
            handle.abort();
        }
    }
}

struct SessionShared {
    config: ViewerConfig,
    capabilities: Capabilities,
    state: Mutex<ViewerState>,
    cache: SharedPageCache,
    preloader: Preloader,
    resolver: Arc<dyn PageResolver>,
    telemetry: Arc<Telemetry>,
    snapshot_tx: watch::Sender<ViewerSnapshot>,
    timers: Mutex<SessionTimers>,
    /// Advanced on every user interaction; a hide timer only fires while its
    /// token is current.
    activity: GenerationClock,
}

impl SessionShared {
    fn state(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, SessionTimers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ViewerState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn dispose(&self) {
        {
            let mut state = self.state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.pending = None;
            state.controls_visible = false;
            state.phase = ViewerPhase::Idle;
            self.publish(&state);
        }
        self.timers().abort_all();
        self.preloader.abort_all();
        self.cache.dispose();
        self.telemetry.clear_marks_with_prefix("nav:");
        self.telemetry
            .log(LogLevel::Info, "session", "Viewer session closed", None);
    }
}

pub struct ViewerSession {
    shared: Arc<SessionShared>,
    offline_task: Mutex<Option<JoinHandle<OfflineCacheReport>>>,
}

impl ViewerSession {
    /// Open a session at page 1 and wait for that page to load (or fail).
    pub async fn open(
        total_pages: u32,
        resolver: Arc<dyn PageResolver>,
        config: ViewerConfig,
    ) -> ViewerResult<Self> {
        let config = config.normalized();
        if total_pages == 0 {
            return Err(ViewerError::InvalidNavigation {
                target: 1,
                current_page: 0,
                total_pages,
            });
        }

        let capabilities = config.capabilities();
        let telemetry = Arc::new(Telemetry::new(
            config.telemetry_history,
            capabilities.telemetry,
        ));
        let cache = SharedPageCache::new(config.cache_capacity);
        let preloader = Preloader::new(cache.clone(), Arc::clone(&telemetry), config.cache_window);
        let state = ViewerState::new(total_pages, config.initial_zoom);
        let (snapshot_tx, _rx) = watch::channel(state.snapshot());

        let shared = Arc::new(SessionShared {
            config,
            capabilities,
            state: Mutex::new(state),
            cache,
            preloader,
            resolver,
            telemetry,
            snapshot_tx,
            timers: Mutex::new(SessionTimers::default()),
            activity: GenerationClock::new(),
        });
        shared.telemetry.log(
            LogLevel::Info,
            "session",
            "Viewer session opened",
            Some(serde_json::json!({
                "total_pages": total_pages,
                "capabilities": capabilities,
            })),
        );

        let session = Self {
            shared,
            offline_task: Mutex::new(None),
        };
        session.shared.load_initial_page().await;
        session.register_activity();
        session.shared.start_pressure_monitor();
        Ok(session)
    }

    /// Open a session over a fully-loaded book. When offline support is
    /// enabled and a bridge is given, the book-open event caches the whole
    /// book in the background.
    pub async fn open_book(
        payload: OfflineBookPayload,
        config: ViewerConfig,
        offline: Option<OfflineBridge>,
    ) -> ViewerResult<Self> {
        let resolver = Arc::new(BookPagesResolver::new(payload.pages.clone()));
        let session = Self::open(resolver.total_pages(), resolver, config).await?;
        info!(
            book_id = %payload.book_id,
            title = %payload.title,
            pages = payload.pages.len(),
            "Opened book"
        );

        match offline {
            Some(bridge) if session.shared.capabilities.offline => {
                let task = bridge
                    .with_telemetry(Arc::clone(&session.shared.telemetry))
                    .on_book_open(payload);
                *session
                    .offline_task
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(task);
            }
            Some(_) => debug!("Offline caching disabled; skipping book-open caching"),
            None => {}
        }
        Ok(session)
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.shared.telemetry
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.shared.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    pub fn resident_pages(&self) -> Vec<u32> {
        self.shared.cache.resident_pages()
    }

    /// Wait for the pending navigation (if any) and all background preloads.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut timers = self.shared.timers();
                let mut pending = std::mem::take(&mut timers.committing);
                pending.extend(timers.debounce.take());
                pending
            };
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                let _ = handle.await;
            }
        }
        self.shared.preloader.settle().await;
    }

    /// Result of the book-open offline caching, once it finishes. `None` when
    /// no caching was started or it was already collected.
    pub async fn offline_report(&self) -> Option<OfflineCacheReport> {
        let task = self
            .offline_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        task.await.ok()
    }

    /// Release timers, background work and cached pages. Later commands are
    /// ignored.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state().disposed
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}
