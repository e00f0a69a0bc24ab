use serde::Deserialize;
use ts_rs::TS;

/// Flattened runtime configuration for a viewer session.
///
/// On disk the values live in tables (see `tables.rs`); this struct is what
/// the rest of the crate reads.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "crate::config::defaults::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "crate::config::defaults::default_min_zoom")]
    pub min_zoom: u32,
    #[serde(default = "crate::config::defaults::default_max_zoom")]
    pub max_zoom: u32,
    #[serde(default = "crate::config::defaults::default_zoom_step")]
    pub zoom_step: u32,
    #[serde(default = "crate::config::defaults::default_initial_zoom")]
    pub initial_zoom: u32,
    #[serde(default = "crate::config::defaults::default_cache_window")]
    pub cache_window: u32,
    #[serde(default = "crate::config::defaults::default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "crate::config::defaults::default_pressure_check_secs")]
    pub pressure_check_secs: u64,
    #[serde(default = "crate::config::defaults::default_pressure_ratio")]
    pub pressure_ratio: f32,
    #[serde(default = "crate::config::defaults::default_controls_hide_secs")]
    pub controls_hide_secs: u64,
    #[serde(default = "crate::config::defaults::default_orientation_settle_ms")]
    pub orientation_settle_ms: u64,
    #[serde(default = "crate::config::defaults::default_true")]
    pub bookmarks_enabled: bool,
    #[serde(default = "crate::config::defaults::default_true")]
    pub offline_enabled: bool,
    #[serde(default = "crate::config::defaults::default_true")]
    pub preload_enabled: bool,
    #[serde(default = "crate::config::defaults::default_durable_cache_dir")]
    pub durable_cache_dir: String,
    #[serde(default = "crate::config::defaults::default_durable_cache_name")]
    pub durable_cache_name: String,
    #[serde(default = "crate::config::defaults::default_telemetry_history")]
    pub telemetry_history: usize,
    #[serde(default = "crate::config::defaults::default_true")]
    pub telemetry_enabled: bool,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            debounce_ms: crate::config::defaults::default_debounce_ms(),
            min_zoom: crate::config::defaults::default_min_zoom(),
            max_zoom: crate::config::defaults::default_max_zoom(),
            zoom_step: crate::config::defaults::default_zoom_step(),
            initial_zoom: crate::config::defaults::default_initial_zoom(),
            cache_window: crate::config::defaults::default_cache_window(),
            cache_capacity: crate::config::defaults::default_cache_capacity(),
            pressure_check_secs: crate::config::defaults::default_pressure_check_secs(),
            pressure_ratio: crate::config::defaults::default_pressure_ratio(),
            controls_hide_secs: crate::config::defaults::default_controls_hide_secs(),
            orientation_settle_ms: crate::config::defaults::default_orientation_settle_ms(),
            bookmarks_enabled: true,
            offline_enabled: true,
            preload_enabled: true,
            durable_cache_dir: crate::config::defaults::default_durable_cache_dir(),
            durable_cache_name: crate::config::defaults::default_durable_cache_name(),
            telemetry_history: crate::config::defaults::default_telemetry_history(),
            telemetry_enabled: true,
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl ViewerConfig {
    /// Pull every value back inside the range the viewer relies on.
    pub fn normalized(mut self) -> Self {
        self.cache_window = self.cache_window.max(1);
        let resident_floor = (self.cache_window as usize) * 2 + 1;
        self.cache_capacity = self.cache_capacity.max(resident_floor);
        self.min_zoom = self.min_zoom.max(1);
        self.max_zoom = self.max_zoom.max(self.min_zoom);
        self.zoom_step = self.zoom_step.max(1);
        self.initial_zoom = self.initial_zoom.clamp(self.min_zoom, self.max_zoom);
        if !(self.pressure_ratio > 0.0 && self.pressure_ratio <= 1.0) {
            self.pressure_ratio = crate::config::defaults::default_pressure_ratio();
        }
        self.pressure_check_secs = self.pressure_check_secs.max(1);
        self.telemetry_history = self.telemetry_history.max(1);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            preload: self.preload_enabled,
            offline: self.offline_enabled,
            bookmarks: self.bookmarks_enabled,
            telemetry: self.telemetry_enabled,
        }
    }
}

/// Feature switches resolved once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, TS)]
#[ts(export)]
pub struct Capabilities {
    pub preload: bool,
    pub offline: bool,
    pub bookmarks: bool,
    pub telemetry: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        ViewerConfig::default().capabilities()
    }
}

/// Log verbosity, shared by the tracing filter and telemetry records.
#[derive(
    Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, PartialOrd, Ord, TS,
)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
