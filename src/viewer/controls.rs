use super::{SessionShared, ViewerSession};
use crate::config::LogLevel;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

impl ViewerSession {
    pub fn zoom_in(&self) -> u32 {
        let step = i64::from(self.shared.config.zoom_step);
        self.shared.adjust_zoom(step)
    }

    pub fn zoom_out(&self) -> u32 {
        let step = i64::from(self.shared.config.zoom_step);
        self.shared.adjust_zoom(-step)
    }

    /// Add or remove the current page from the bookmarks. Returns whether the
    /// page is bookmarked afterwards.
    pub fn toggle_bookmark(&self) -> bool {
        let shared = &self.shared;
        let mut state = shared.state();
        let page = state.current_page;
        if state.disposed || !shared.capabilities.bookmarks {
            trace!(page, "Bookmarks unavailable");
            return state.bookmarked_pages.contains(&page);
        }
        let bookmarked = if state.bookmarked_pages.remove(&page) {
            false
        } else {
            state.bookmarked_pages.insert(page);
            true
        };
        shared.publish(&state);
        drop(state);

        shared.telemetry.log(
            LogLevel::Info,
            "bookmarks",
            if bookmarked {
                "Bookmark added"
            } else {
                "Bookmark removed"
            },
            Some(serde_json::json!({ "page": page })),
        );
        bookmarked
    }

    pub fn is_bookmarked(&self, page: u32) -> bool {
        self.shared.state().bookmarked_pages.contains(&page)
    }

    /// Show the controls and restart the inactivity countdown that hides them.
    pub fn register_activity(&self) {
        self.shared.register_activity();
    }
}

impl SessionShared {
    fn adjust_zoom(&self, delta: i64) -> u32 {
        let mut state = self.state();
        if state.disposed {
            return state.zoom_level;
        }
        let min = i64::from(self.config.min_zoom);
        let max = i64::from(self.config.max_zoom);
        let next = (i64::from(state.zoom_level) + delta).clamp(min, max);
        let next = u32::try_from(next).unwrap_or(self.config.max_zoom);
        if next != state.zoom_level {
            trace!(from = state.zoom_level, to = next, "Zoom changed");
            state.zoom_level = next;
            self.publish(&state);
        }
        next
    }

    pub(super) fn register_activity(self: &Arc<Self>) {
        let token = {
            let mut state = self.state();
            if state.disposed {
                return;
            }
            let token = self.activity.advance();
            if !state.controls_visible {
                state.controls_visible = true;
                self.publish(&state);
            }
            token
        };

        let weak = Arc::downgrade(self);
        let delay = Duration::from_secs(self.config.controls_hide_secs);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.state();
            if state.disposed || token.is_stale() {
                return;
            }
            state.controls_visible = false;
            shared.publish(&state);
            trace!("Controls hidden after inactivity");
        });
        if let Some(previous) = self.timers().inactivity.replace(timer) {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ViewerConfig;
    use crate::resolver::{BookPagesResolver, PageResolver};
    use crate::viewer::ViewerSession;
    use std::sync::Arc;
    use std::time::Duration;

    async fn session(config: ViewerConfig) -> ViewerSession {
        let pages: Vec<String> = (1..=5).map(|idx| format!("page {idx}")).collect();
        let resolver: Arc<dyn PageResolver> = Arc::new(BookPagesResolver::new(pages));
        ViewerSession::open(5, resolver, config).await.expect("open")
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_is_clamped_to_bounds() {
        let viewer = session(ViewerConfig::default()).await;
        for _ in 0..20 {
            viewer.zoom_in();
        }
        assert_eq!(viewer.snapshot().zoom_level, 300);
        for _ in 0..20 {
            viewer.zoom_out();
        }
        assert_eq!(viewer.zoom_out(), 25);
        assert_eq!(viewer.zoom_in(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn bookmark_toggle_is_an_involution() {
        let viewer = session(ViewerConfig::default()).await;
        assert!(viewer.toggle_bookmark());
        assert_eq!(viewer.snapshot().bookmarked_pages, vec![1]);
        assert!(!viewer.toggle_bookmark());
        assert!(viewer.snapshot().bookmarked_pages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bookmarks_can_be_switched_off() {
        let viewer = session(ViewerConfig {
            bookmarks_enabled: false,
            ..ViewerConfig::default()
        })
        .await;
        assert!(!viewer.toggle_bookmark());
        assert!(!viewer.is_bookmarked(1));
    }

    #[tokio::test(start_paused = true)]
    async fn controls_hide_after_inactivity() {
        let viewer = session(ViewerConfig::default()).await;
        assert!(viewer.snapshot().controls_visible);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        viewer.register_activity();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(viewer.snapshot().controls_visible);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!viewer.snapshot().controls_visible);
    }
}
