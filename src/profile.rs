//! Device classification and scaling profile.
//!
//! `compute_profile` is a pure function of the viewport signals. The
//! `ProfileTracker` wraps it for hosts that feed resize and orientation
//! events: resizes recompute immediately, orientation changes wait for the
//! reported dimensions to settle first.

use crate::cancellation::GenerationClock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use ts_rs::TS;

pub const MOBILE_MAX_WIDTH: u32 = 768;
pub const TABLET_MAX_WIDTH: u32 = 1024;
pub const COMPACT_WIDTH: u32 = 360;
pub const WIDE_WIDTH: u32 = 1440;
/// Minimum comfortable touch target (px) on touch screens.
pub const MIN_TOUCH_TARGET: u32 = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn classify(viewport_width: u32) -> Self {
        if viewport_width <= MOBILE_MAX_WIDTH {
            DeviceType::Mobile
        } else if viewport_width <= TABLET_MAX_WIDTH {
            DeviceType::Tablet
        } else {
            DeviceType::Desktop
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ViewportSignals {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub is_touch: bool,
}

impl Default for ViewportSignals {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            pixel_ratio: 1.0,
            is_touch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScalingConfig {
    pub device: DeviceType,
    pub base_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub font_size: u32,
    pub spacing: u32,
    pub touch_target_size: u32,
    pub is_landscape: bool,
}

struct ProfileRow {
    base_scale: f32,
    min_scale: f32,
    max_scale: f32,
    font_size: u32,
    spacing: u32,
    touch_target_size: u32,
}

const MOBILE_ROW: ProfileRow = ProfileRow {
    base_scale: 0.9,
    min_scale: 0.75,
    max_scale: 1.25,
    font_size: 14,
    spacing: 8,
    touch_target_size: 48,
};

const TABLET_ROW: ProfileRow = ProfileRow {
    base_scale: 1.0,
    min_scale: 0.85,
    max_scale: 1.4,
    font_size: 16,
    spacing: 12,
    touch_target_size: 44,
};

const DESKTOP_ROW: ProfileRow = ProfileRow {
    base_scale: 1.0,
    min_scale: 0.9,
    max_scale: 1.5,
    font_size: 16,
    spacing: 16,
    touch_target_size: 32,
};

pub fn compute_profile(signals: ViewportSignals) -> ScalingConfig {
    let device = DeviceType::classify(signals.width);
    let row = match device {
        DeviceType::Mobile => &MOBILE_ROW,
        DeviceType::Tablet => &TABLET_ROW,
        DeviceType::Desktop => &DESKTOP_ROW,
    };

    let mut config = ScalingConfig {
        device,
        base_scale: row.base_scale,
        min_scale: row.min_scale,
        max_scale: row.max_scale,
        font_size: row.font_size,
        spacing: row.spacing,
        touch_target_size: row.touch_target_size,
        is_landscape: signals.width > signals.height,
    };

    if signals.width < COMPACT_WIDTH {
        config.base_scale *= 0.9;
        config.font_size = config.font_size.saturating_sub(1);
        config.spacing = config.spacing.saturating_sub(2);
    } else if signals.width > WIDE_WIDTH {
        config.base_scale *= 1.1;
        config.font_size += 2;
        config.spacing += 4;
    }

    if signals.pixel_ratio >= 2.0 {
        config.min_scale = (config.min_scale - 0.1).max(0.5);
    }

    if signals.is_touch {
        config.touch_target_size = config.touch_target_size.max(MIN_TOUCH_TARGET);
    }

    config.base_scale = config.base_scale.clamp(config.min_scale, config.max_scale);
    config
}

/// Tracks the latest viewport and publishes recomputed profiles.
pub struct ProfileTracker {
    latest: Arc<Mutex<ViewportSignals>>,
    clock: GenerationClock,
    settle_delay: Duration,
    tx: Arc<watch::Sender<ScalingConfig>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ProfileTracker {
    pub fn new(initial: ViewportSignals, settle_delay: Duration) -> Self {
        let (tx, _rx) = watch::channel(compute_profile(initial));
        Self {
            latest: Arc::new(Mutex::new(initial)),
            clock: GenerationClock::new(),
            settle_delay,
            tx: Arc::new(tx),
            pending: Mutex::new(None),
        }
    }

    pub fn current(&self) -> ScalingConfig {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScalingConfig> {
        self.tx.subscribe()
    }

    pub fn on_resize(&self, signals: ViewportSignals) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = signals;
        publish(&self.tx, compute_profile(signals));
    }

    /// Record an orientation change; the profile is recomputed from whatever
    /// viewport is reported once the settle delay elapses. A later change
    /// supersedes an earlier one that has not fired yet.
    pub fn on_orientation_change(&self, signals: ViewportSignals) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = signals;
        let token = self.clock.advance();

        let latest = Arc::clone(&self.latest);
        let tx = Arc::clone(&self.tx);
        let delay = self.settle_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if token.is_stale() {
                return;
            }
            let signals = *latest.lock().unwrap_or_else(PoisonError::into_inner);
            debug!(width = signals.width, height = signals.height, "Orientation settled");
            publish(&tx, compute_profile(signals));
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for ProfileTracker {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

fn publish(tx: &watch::Sender<ScalingConfig>, profile: ScalingConfig) {
    tx.send_if_modified(|current| {
        if *current == profile {
            return false;
        }
        *current = profile;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(width: u32, height: u32) -> ViewportSignals {
        ViewportSignals {
            width,
            height,
            pixel_ratio: 1.0,
            is_touch: false,
        }
    }

    #[test]
    fn width_thresholds_classify_devices() {
        assert_eq!(DeviceType::classify(320), DeviceType::Mobile);
        assert_eq!(DeviceType::classify(768), DeviceType::Mobile);
        assert_eq!(DeviceType::classify(769), DeviceType::Tablet);
        assert_eq!(DeviceType::classify(1024), DeviceType::Tablet);
        assert_eq!(DeviceType::classify(1025), DeviceType::Desktop);
    }

    #[test]
    fn compact_screens_shrink_type_and_spacing() {
        let compact = compute_profile(signals(340, 640));
        let regular = compute_profile(signals(400, 800));
        assert_eq!(compact.device, DeviceType::Mobile);
        assert!(compact.font_size < regular.font_size);
        assert!(compact.spacing < regular.spacing);
        assert!(compact.base_scale < regular.base_scale);
    }

    #[test]
    fn wide_desktops_grow_type() {
        let wide = compute_profile(signals(1920, 1080));
        let regular = compute_profile(signals(1280, 800));
        assert_eq!(wide.device, DeviceType::Desktop);
        assert_eq!(wide.font_size, regular.font_size + 2);
        assert!(wide.base_scale <= wide.max_scale);
        assert!(wide.is_landscape);
    }

    #[test]
    fn touch_devices_get_large_targets() {
        let mut touch = signals(1280, 800);
        touch.is_touch = true;
        assert_eq!(compute_profile(touch).touch_target_size, MIN_TOUCH_TARGET);
        assert_eq!(compute_profile(signals(1280, 800)).touch_target_size, 32);
    }

    #[tokio::test(start_paused = true)]
    async fn orientation_change_waits_for_dimensions_to_settle() {
        let tracker = ProfileTracker::new(signals(600, 900), Duration::from_millis(100));
        assert!(!tracker.current().is_landscape);

        tracker.on_orientation_change(signals(900, 600));
        // Dimensions keep changing while the rotation animates.
        tracker.on_orientation_change(signals(1100, 700));
        assert!(!tracker.current().is_landscape);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let settled = tracker.current();
        assert!(settled.is_landscape);
        assert_eq!(settled.device, DeviceType::Desktop);
    }

    #[tokio::test]
    async fn resize_recomputes_immediately() {
        let tracker = ProfileTracker::new(signals(1280, 800), Duration::from_millis(100));
        let mut rx = tracker.subscribe();
        tracker.on_resize(signals(500, 800));
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().device, DeviceType::Mobile);
    }
}
