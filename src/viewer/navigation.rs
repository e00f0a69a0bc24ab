use super::{SessionShared, ViewerPhase, ViewerSession};
use crate::config::LogLevel;
use crate::error::{ViewerError, ViewerResult};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

impl ViewerSession {
    /// Request navigation to `page`. The move is committed once no newer
    /// request arrives within the debounce interval; only the last target of
    /// a burst is ever loaded.
    pub fn go_to_page(&self, page: u32) -> ViewerResult<()> {
        self.shared.request_navigation(page)
    }

    pub fn go_to_next_page(&self) -> ViewerResult<()> {
        let current = self.shared.state().current_page;
        self.shared.request_navigation(current.saturating_add(1))
    }

    pub fn go_to_previous_page(&self) -> ViewerResult<()> {
        let current = self.shared.state().current_page;
        self.shared.request_navigation(current.saturating_sub(1))
    }

    /// Drop cached pages outside a tightened window around the current page.
    /// Returns how many pages were evicted.
    pub fn relieve_cache_pressure(&self) -> usize {
        self.shared.relieve_cache_pressure()
    }
}

impl SessionShared {
    fn request_navigation(self: &Arc<Self>, page: u32) -> ViewerResult<()> {
        let (request, superseded) = {
            let mut state = self.state();
            if state.disposed {
                trace!(page, "Ignoring navigation on a closed session");
                return Ok(());
            }
            if let Err(err) = state.validate_target(page) {
                drop(state);
                self.reject_navigation(&err);
                return Err(err);
            }
            let (request, superseded) = state.enqueue(page);
            if let Some(previous) = superseded {
                trace!(previous, request = request.id, "Superseded pending navigation");
            }
            self.publish(&state);
            (request, superseded)
        };
        if let Some(previous) = superseded {
            self.telemetry.clear_mark(&format!("nav:{previous}"));
        }

        debug!(target_page = request.target_page, request = request.id, "Navigation requested");
        self.telemetry.mark(format!("nav:{}", request.id));

        let weak = Arc::downgrade(self);
        let delay = Duration::from_millis(self.config.debounce_ms);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.commit(request.id).await;
            }
        });
        let mut timers = self.timers();
        if let Some(previous) = timers.debounce.replace(timer) {
            if superseded.is_some() {
                previous.abort();
            } else {
                timers.committing.retain(|task| !task.is_finished());
                timers.committing.push(previous);
            }
        }
        Ok(())
    }

    fn reject_navigation(&self, err: &ViewerError) {
        warn!("Invalid navigation: {err}");
        if let ViewerError::InvalidNavigation {
            target,
            current_page,
            total_pages,
        } = err
        {
            self.telemetry.log(
                LogLevel::Warn,
                "navigation",
                "Invalid navigation attempt",
                Some(serde_json::json!({
                    "target": target,
                    "current_page": current_page,
                    "total_pages": total_pages,
                })),
            );
        }
    }

    pub(super) async fn load_initial_page(self: &Arc<Self>) {
        let request = {
            let mut state = self.state();
            let first_page = state.current_page;
            let (request, _) = state.enqueue(first_page);
            self.publish(&state);
            request
        };
        self.telemetry.mark(format!("nav:{}", request.id));
        self.commit(request.id).await;
    }

    /// Apply the pending request `request_id` if it is still the newest one.
    async fn commit(self: &Arc<Self>, request_id: u64) {
        let mark = format!("nav:{request_id}");
        let (page, total_pages) = {
            let mut state = self.state();
            if state.disposed {
                drop(state);
                self.telemetry.clear_mark(&mark);
                return;
            }
            let Some(request) = state.take_pending(request_id) else {
                drop(state);
                trace!(request_id, "Pending navigation already replaced");
                self.telemetry.clear_mark(&mark);
                return;
            };
            state.current_page = request.target_page;
            state.committed_request = request.id;
            state.page_content = None;
            state.phase = ViewerPhase::Loading {
                target: request.target_page,
            };
            self.publish(&state);
            (request.target_page, state.total_pages)
        };

        self.preloader.invalidate();
        let evicted = self.cache.cleanup(page, self.config.cache_window);
        if evicted > 0 {
            trace!(page, evicted, "Evicted pages outside the cache window");
        }
        if self.capabilities.preload {
            self.preloader
                .preload_adjacent(page, total_pages, &self.resolver);
        }

        let resolved = match self.cache.get(page) {
            Some(content) => Ok(content),
            None => self.resolver.resolve(page).await.map(Arc::<str>::from),
        };

        let outcome = {
            let mut state = self.state();
            if state.disposed || state.committed_request != request_id {
                let overtaken = !state.disposed;
                drop(state);
                if overtaken {
                    trace!(request_id, page, "Commit overtaken by a newer navigation");
                    self.telemetry.measure("navigation-superseded", &mark, None);
                }
                self.telemetry.clear_mark(&mark);
                return;
            }
            let settled = state.pending.is_none();
            let outcome = match resolved {
                Ok(content) => {
                    self.cache.put(page, Arc::clone(&content));
                    state.page_content = Some(content);
                    if settled {
                        state.phase = ViewerPhase::Ready;
                    }
                    Ok(())
                }
                Err(err) => {
                    if settled {
                        state.phase = ViewerPhase::Failed {
                            page,
                            message: err.message.clone(),
                        };
                    }
                    Err(err)
                }
            };
            self.publish(&state);
            outcome
        };

        self.telemetry.measure("navigation", &mark, None);
        self.telemetry.clear_mark(&mark);
        match outcome {
            Ok(()) => self.telemetry.log(
                LogLevel::Info,
                "navigation",
                "Committed page",
                Some(serde_json::json!({ "page": page })),
            ),
            Err(err) => self.telemetry.log(
                LogLevel::Error,
                "navigation",
                "Page failed to load",
                Some(serde_json::json!({ "page": page, "error": err.message })),
            ),
        }
    }

    pub(super) fn relieve_cache_pressure(&self) -> usize {
        let current = self.state().current_page;
        let window = (self.config.cache_window / 2).max(1);
        let evicted = self.cache.cleanup(current, window);
        self.telemetry.log(
            LogLevel::Warn,
            "memory",
            "Relieved page cache pressure",
            Some(serde_json::json!({
                "current_page": current,
                "window": window,
                "evicted": evicted,
            })),
        );
        evicted
    }

    pub(super) fn start_pressure_monitor(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.pressure_check_secs);
        let ratio = self.config.pressure_ratio;
        let monitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let stats = shared.cache.stats();
                if stats.under_pressure(ratio) {
                    debug!(
                        resident = stats.resident_count,
                        capacity = stats.capacity,
                        "Page cache under pressure"
                    );
                    shared.relieve_cache_pressure();
                }
            }
        });
        if let Some(previous) = self.timers().pressure.replace(monitor) {
            previous.abort();
        }
    }
}
