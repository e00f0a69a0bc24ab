//! Structured event log and timing marks for viewer diagnostics.
//!
//! Records are mirrored into `tracing`, kept in a bounded history for later
//! inspection, and broadcast to any external subscriber. Nothing in here can
//! fail a caller: a poisoned lock is recovered and a missing subscriber is
//! ignored.

use crate::config::LogLevel;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::time::Instant;
use ts_rs::TS;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct TelemetryRecord {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    #[ts(type = "unknown")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp_ms: u64,
}

struct TelemetryInner {
    marks: HashMap<String, Instant>,
    history: VecDeque<TelemetryRecord>,
    capacity: usize,
}

pub struct Telemetry {
    enabled: bool,
    inner: Mutex<TelemetryInner>,
    tx: broadcast::Sender<TelemetryRecord>,
}

impl Telemetry {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            enabled,
            inner: Mutex::new(TelemetryInner {
                marks: HashMap::new(),
                history: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
            }),
            tx,
        }
    }

    pub fn disabled() -> Self {
        Self::new(1, false)
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, name: impl Into<String>) {
        self.lock().marks.insert(name.into(), Instant::now());
    }

    /// Duration between two marks, or from `start_mark` until now when no end
    /// mark is given. The measurement is logged under `performance`.
    pub fn measure(&self, name: &str, start_mark: &str, end_mark: Option<&str>) -> Option<Duration> {
        let elapsed = {
            let inner = self.lock();
            let start = *inner.marks.get(start_mark)?;
            let end = match end_mark {
                Some(mark) => *inner.marks.get(mark)?,
                None => Instant::now(),
            };
            end.saturating_duration_since(start)
        };
        self.log(
            LogLevel::Debug,
            "performance",
            name,
            Some(serde_json::json!({
                "start_mark": start_mark,
                "end_mark": end_mark,
                "duration_ms": elapsed.as_secs_f64() * 1000.0,
            })),
        );
        Some(elapsed)
    }

    pub fn clear_mark(&self, name: &str) {
        self.lock().marks.remove(name);
    }

    /// Drop every open mark whose name starts with `prefix`.
    pub fn clear_marks_with_prefix(&self, prefix: &str) {
        self.lock().marks.retain(|name, _| !name.starts_with(prefix));
    }

    /// Names of the marks that have not been cleared yet, sorted.
    pub fn open_marks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().marks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn log(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) {
        mirror_to_tracing(level, category, message, metadata.as_ref());
        if !self.enabled {
            return;
        }

        let record = TelemetryRecord {
            level,
            category: category.to_string(),
            message: message.to_string(),
            metadata,
            timestamp_ms: unix_millis(),
        };
        {
            let mut inner = self.lock();
            if inner.history.len() == inner.capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(record.clone());
        }
        let _ = self.tx.send(record);
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn records_in(&self, category: &str) -> Vec<TelemetryRecord> {
        self.lock()
            .history
            .iter()
            .filter(|record| record.category == category)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.tx.subscribe()
    }
}

fn mirror_to_tracing(
    level: LogLevel,
    category: &str,
    message: &str,
    metadata: Option<&serde_json::Value>,
) {
    let metadata = metadata.map(|value| value.to_string()).unwrap_or_default();
    match level {
        LogLevel::Trace => tracing::trace!(category, metadata = %metadata, "{message}"),
        LogLevel::Debug => tracing::debug!(category, metadata = %metadata, "{message}"),
        LogLevel::Info => tracing::info!(category, metadata = %metadata, "{message}"),
        LogLevel::Warn => tracing::warn!(category, metadata = %metadata, "{message}"),
        LogLevel::Error => tracing::error!(category, metadata = %metadata, "{message}"),
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded() {
        let telemetry = Telemetry::new(3, true);
        for idx in 0..5 {
            telemetry.log(LogLevel::Info, "test", &format!("event {idx}"), None);
        }
        let messages: Vec<_> = telemetry
            .records()
            .into_iter()
            .map(|record| record.message)
            .collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn measure_spans_between_marks() {
        let telemetry = Telemetry::new(10, true);
        telemetry.mark("nav:start");
        tokio::time::sleep(Duration::from_millis(40)).await;
        telemetry.mark("nav:end");
        let elapsed = telemetry
            .measure("navigation", "nav:start", Some("nav:end"))
            .expect("both marks exist");
        assert_eq!(elapsed, Duration::from_millis(40));

        let perf = telemetry.records_in("performance");
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].message, "navigation");
        assert_eq!(perf[0].level, LogLevel::Debug);
    }

    #[test]
    fn prefixed_marks_can_be_dropped_together() {
        let telemetry = Telemetry::new(4, true);
        telemetry.mark("nav:1");
        telemetry.mark("nav:2");
        telemetry.mark("preload:1");
        assert_eq!(telemetry.open_marks(), vec!["nav:1", "nav:2", "preload:1"]);
        telemetry.clear_marks_with_prefix("nav:");
        assert_eq!(telemetry.open_marks(), vec!["preload:1"]);
    }

    #[test]
    fn measure_without_start_mark_is_none() {
        let telemetry = Telemetry::new(10, true);
        assert!(telemetry.measure("missing", "nope", None).is_none());
        assert!(telemetry.records().is_empty());
    }

    #[test]
    fn disabled_telemetry_keeps_no_history() {
        let telemetry = Telemetry::disabled();
        telemetry.log(LogLevel::Warn, "navigation", "ignored", None);
        assert!(telemetry.records().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_records() {
        let telemetry = Telemetry::new(10, true);
        let mut rx = telemetry.subscribe();
        telemetry.log(
            LogLevel::Warn,
            "offline",
            "asset failed",
            Some(serde_json::json!({ "url": "bad" })),
        );
        let record = rx.recv().await.expect("record delivered");
        assert_eq!(record.category, "offline");
        assert_eq!(record.metadata, Some(serde_json::json!({ "url": "bad" })));
    }
}
