use crate::error::ViewerError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use ts_rs::TS;

/// Where the session is in a page transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "state", rename_all = "snake_case")]
#[ts(export)]
pub enum ViewerPhase {
    Idle,
    Loading { target: u32 },
    Ready,
    Failed { page: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ViewerSnapshot {
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom_level: u32,
    pub bookmarked_pages: Vec<u32>,
    pub controls_visible: bool,
    pub phase: ViewerPhase,
    pub can_go_next: bool,
    pub can_go_previous: bool,
    pub page_content: Option<String>,
}

/// A navigation target waiting out the debounce interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationRequest {
    pub id: u64,
    pub target_page: u32,
    pub requested_at: Instant,
}

#[derive(Debug)]
pub(super) struct ViewerState {
    pub(super) total_pages: u32,
    pub(super) current_page: u32,
    pub(super) zoom_level: u32,
    pub(super) bookmarked_pages: BTreeSet<u32>,
    pub(super) controls_visible: bool,
    pub(super) phase: ViewerPhase,
    /// Single pending slot; a new request overwrites it, never queues.
    pub(super) pending: Option<NavigationRequest>,
    pub(super) next_request_id: u64,
    pub(super) committed_request: u64,
    pub(super) page_content: Option<Arc<str>>,
    pub(super) disposed: bool,
}

impl ViewerState {
    pub(super) fn new(total_pages: u32, zoom_level: u32) -> Self {
        Self {
            total_pages,
            current_page: 1,
            zoom_level,
            bookmarked_pages: BTreeSet::new(),
            controls_visible: false,
            phase: ViewerPhase::Idle,
            pending: None,
            next_request_id: 0,
            committed_request: 0,
            page_content: None,
            disposed: false,
        }
    }

    pub(super) fn validate_target(&self, target: u32) -> Result<(), ViewerError> {
        if target < 1 || target > self.total_pages || target == self.current_page {
            return Err(ViewerError::InvalidNavigation {
                target,
                current_page: self.current_page,
                total_pages: self.total_pages,
            });
        }
        Ok(())
    }

    /// Put `target` in the pending slot and enter `Loading`. Returns the new
    /// request and the id of the request it replaced, if any.
    pub(super) fn enqueue(&mut self, target: u32) -> (NavigationRequest, Option<u64>) {
        self.next_request_id += 1;
        let request = NavigationRequest {
            id: self.next_request_id,
            target_page: target,
            requested_at: Instant::now(),
        };
        let superseded = self.pending.replace(request).map(|previous| previous.id);
        self.phase = ViewerPhase::Loading { target };
        (request, superseded)
    }

    /// Take the pending request if it is still `request_id`.
    pub(super) fn take_pending(&mut self, request_id: u64) -> Option<NavigationRequest> {
        match self.pending {
            Some(request) if request.id == request_id => self.pending.take(),
            _ => None,
        }
    }

    pub(super) fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            current_page: self.current_page,
            total_pages: self.total_pages,
            zoom_level: self.zoom_level,
            bookmarked_pages: self.bookmarked_pages.iter().copied().collect(),
            controls_visible: self.controls_visible,
            phase: self.phase.clone(),
            can_go_next: self.current_page < self.total_pages,
            can_go_previous: self.current_page > 1,
            page_content: self.page_content.as_deref().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_out_of_bounds_and_current_page() {
        let state = ViewerState::new(15, 100);
        assert!(state.validate_target(0).is_err());
        assert!(state.validate_target(16).is_err());
        assert!(state.validate_target(1).is_err());
        assert!(state.validate_target(2).is_ok());
        assert!(state.validate_target(15).is_ok());
    }

    #[tokio::test]
    async fn newer_request_overwrites_the_pending_slot() {
        let mut state = ViewerState::new(10, 100);
        let (first, superseded) = state.enqueue(3);
        assert_eq!(superseded, None);
        let (second, superseded) = state.enqueue(5);
        assert_eq!(superseded, Some(first.id));
        assert_eq!(state.phase, ViewerPhase::Loading { target: 5 });

        assert!(state.take_pending(first.id).is_none());
        assert_eq!(state.take_pending(second.id).map(|r| r.target_page), Some(5));
        assert!(state.pending.is_none());
    }

    #[test]
    fn snapshot_reports_edges() {
        let mut state = ViewerState::new(3, 100);
        let snap = state.snapshot();
        assert!(snap.can_go_next);
        assert!(!snap.can_go_previous);
        state.current_page = 3;
        state.bookmarked_pages.extend([3, 1]);
        let snap = state.snapshot();
        assert!(!snap.can_go_next);
        assert!(snap.can_go_previous);
        assert_eq!(snap.bookmarked_pages, vec![1, 3]);
    }

    #[test]
    fn phase_serializes_with_a_state_tag() {
        let json = serde_json::to_value(ViewerPhase::Loading { target: 4 }).expect("serialize");
        assert_eq!(json, serde_json::json!({ "state": "loading", "target": 4 }));
    }
}
