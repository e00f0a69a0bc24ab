use super::{ViewerSession, ViewerSnapshot};
use crate::error::{ViewerError, ViewerResult};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TS)]
#[serde(tag = "command", rename_all = "snake_case")]
#[ts(export)]
pub enum ViewerCommand {
    GetSnapshot,
    GoToPage { page: u32 },
    NextPage,
    PreviousPage,
    ZoomIn,
    ZoomOut,
    ToggleBookmark,
    Activity,
}

impl ViewerCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetSnapshot => "viewer_get_snapshot",
            Self::GoToPage { .. } => "viewer_go_to_page",
            Self::NextPage => "viewer_next_page",
            Self::PreviousPage => "viewer_previous_page",
            Self::ZoomIn => "viewer_zoom_in",
            Self::ZoomOut => "viewer_zoom_out",
            Self::ToggleBookmark => "viewer_toggle_bookmark",
            Self::Activity => "viewer_activity",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewerEvent {
    pub action: &'static str,
    pub snapshot: ViewerSnapshot,
}

impl ViewerSession {
    /// Run one command and return the snapshot it produced. Every command
    /// except `GetSnapshot` counts as user activity. A navigation target
    /// outside the book is logged and otherwise ignored; the event then
    /// carries the unchanged snapshot.
    pub fn apply_command(&self, command: ViewerCommand) -> ViewerResult<ViewerEvent> {
        let action = command.action();
        if command != ViewerCommand::GetSnapshot {
            self.register_activity();
        }
        match command {
            ViewerCommand::GetSnapshot | ViewerCommand::Activity => {}
            ViewerCommand::GoToPage { page } => ignore_rejected(self.go_to_page(page))?,
            ViewerCommand::NextPage => ignore_rejected(self.go_to_next_page())?,
            ViewerCommand::PreviousPage => ignore_rejected(self.go_to_previous_page())?,
            ViewerCommand::ZoomIn => {
                self.zoom_in();
            }
            ViewerCommand::ZoomOut => {
                self.zoom_out();
            }
            ViewerCommand::ToggleBookmark => {
                self.toggle_bookmark();
            }
        }
        Ok(ViewerEvent {
            action,
            snapshot: self.snapshot(),
        })
    }
}

/// Rejected targets were already reported through telemetry.
fn ignore_rejected(result: ViewerResult<()>) -> ViewerResult<()> {
    match result {
        Err(ViewerError::InvalidNavigation { .. }) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::resolver::{BookPagesResolver, PageResolver};
    use std::sync::Arc;

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: ViewerCommand =
            serde_json::from_str(r#"{"command":"go_to_page","page":7}"#).expect("parse");
        assert_eq!(command, ViewerCommand::GoToPage { page: 7 });
        assert_eq!(command.action(), "viewer_go_to_page");
        let command: ViewerCommand =
            serde_json::from_str(r#"{"command":"zoom_in"}"#).expect("parse");
        assert_eq!(command.action(), "viewer_zoom_in");
    }

    #[tokio::test(start_paused = true)]
    async fn apply_command_reports_the_resulting_snapshot() {
        let pages: Vec<String> = (1..=3).map(|idx| format!("page {idx}")).collect();
        let resolver: Arc<dyn PageResolver> = Arc::new(BookPagesResolver::new(pages));
        let viewer = ViewerSession::open(3, resolver, ViewerConfig::default())
            .await
            .expect("open");

        let event = viewer.apply_command(ViewerCommand::ZoomIn).expect("zoom");
        assert_eq!(event.action, "viewer_zoom_in");
        assert_eq!(event.snapshot.zoom_level, 125);

        let event = viewer
            .apply_command(ViewerCommand::PreviousPage)
            .expect("previous on the first page is ignored");
        assert_eq!(event.action, "viewer_previous_page");
        assert_eq!(event.snapshot.current_page, 1);
        viewer.apply_command(ViewerCommand::NextPage).expect("next");
        viewer.settle().await;
        assert_eq!(viewer.snapshot().current_page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_commands_are_logged_not_returned() {
        let pages: Vec<String> = (1..=3).map(|idx| format!("page {idx}")).collect();
        let resolver: Arc<dyn PageResolver> = Arc::new(BookPagesResolver::new(pages));
        let viewer = ViewerSession::open(3, resolver, ViewerConfig::default())
            .await
            .expect("open");

        let event = viewer
            .apply_command(ViewerCommand::GoToPage { page: 99 })
            .expect("rejected target is not an error");
        assert_eq!(event.action, "viewer_go_to_page");
        assert_eq!(event.snapshot.current_page, 1);
        assert_eq!(event.snapshot.total_pages, 3);
        viewer.settle().await;
        assert_eq!(viewer.snapshot().current_page, 1);

        let warnings = viewer
            .telemetry()
            .records_in("navigation")
            .into_iter()
            .filter(|record| record.message == "Invalid navigation attempt")
            .count();
        assert_eq!(warnings, 1);
    }
}
