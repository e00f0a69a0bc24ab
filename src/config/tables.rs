use super::defaults;
use super::models::{LogLevel, ViewerConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    navigation: NavigationConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    ui: UiConfig,
    #[serde(default)]
    offline: OfflineConfig,
    #[serde(default)]
    telemetry: TelemetryConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for ViewerConfig {
    fn from(tables: ConfigTables) -> Self {
        ViewerConfig {
            debounce_ms: tables.navigation.debounce_ms,
            min_zoom: tables.navigation.min_zoom,
            max_zoom: tables.navigation.max_zoom,
            zoom_step: tables.navigation.zoom_step,
            initial_zoom: tables.navigation.initial_zoom,
            cache_window: tables.cache.window,
            cache_capacity: tables.cache.capacity,
            pressure_check_secs: tables.cache.pressure_check_secs,
            pressure_ratio: tables.cache.pressure_ratio,
            controls_hide_secs: tables.ui.controls_hide_secs,
            orientation_settle_ms: tables.ui.orientation_settle_ms,
            bookmarks_enabled: tables.ui.bookmarks_enabled,
            offline_enabled: tables.offline.offline_enabled,
            preload_enabled: tables.offline.preload_enabled,
            durable_cache_dir: tables.offline.durable_cache_dir,
            durable_cache_name: tables.offline.durable_cache_name,
            telemetry_history: tables.telemetry.telemetry_history,
            telemetry_enabled: tables.telemetry.telemetry_enabled,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&ViewerConfig> for ConfigTables {
    fn from(config: &ViewerConfig) -> Self {
        ConfigTables {
            navigation: NavigationConfig {
                debounce_ms: config.debounce_ms,
                min_zoom: config.min_zoom,
                max_zoom: config.max_zoom,
                zoom_step: config.zoom_step,
                initial_zoom: config.initial_zoom,
            },
            cache: CacheConfig {
                window: config.cache_window,
                capacity: config.cache_capacity,
                pressure_check_secs: config.pressure_check_secs,
                pressure_ratio: config.pressure_ratio,
            },
            ui: UiConfig {
                controls_hide_secs: config.controls_hide_secs,
                orientation_settle_ms: config.orientation_settle_ms,
                bookmarks_enabled: config.bookmarks_enabled,
            },
            offline: OfflineConfig {
                offline_enabled: config.offline_enabled,
                preload_enabled: config.preload_enabled,
                durable_cache_dir: config.durable_cache_dir.clone(),
                durable_cache_name: config.durable_cache_name.clone(),
            },
            telemetry: TelemetryConfig {
                telemetry_history: config.telemetry_history,
                telemetry_enabled: config.telemetry_enabled,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct NavigationConfig {
    #[serde(default = "defaults::default_debounce_ms")]
    debounce_ms: u64,
    #[serde(default = "defaults::default_min_zoom")]
    min_zoom: u32,
    #[serde(default = "defaults::default_max_zoom")]
    max_zoom: u32,
    #[serde(default = "defaults::default_zoom_step")]
    zoom_step: u32,
    #[serde(default = "defaults::default_initial_zoom")]
    initial_zoom: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::default_debounce_ms(),
            min_zoom: defaults::default_min_zoom(),
            max_zoom: defaults::default_max_zoom(),
            zoom_step: defaults::default_zoom_step(),
            initial_zoom: defaults::default_initial_zoom(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct CacheConfig {
    #[serde(default = "defaults::default_cache_window")]
    window: u32,
    #[serde(default = "defaults::default_cache_capacity")]
    capacity: usize,
    #[serde(default = "defaults::default_pressure_check_secs")]
    pressure_check_secs: u64,
    #[serde(default = "defaults::default_pressure_ratio")]
    pressure_ratio: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window: defaults::default_cache_window(),
            capacity: defaults::default_cache_capacity(),
            pressure_check_secs: defaults::default_pressure_check_secs(),
            pressure_ratio: defaults::default_pressure_ratio(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct UiConfig {
    #[serde(default = "defaults::default_controls_hide_secs")]
    controls_hide_secs: u64,
    #[serde(default = "defaults::default_orientation_settle_ms")]
    orientation_settle_ms: u64,
    #[serde(default = "defaults::default_true")]
    bookmarks_enabled: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            controls_hide_secs: defaults::default_controls_hide_secs(),
            orientation_settle_ms: defaults::default_orientation_settle_ms(),
            bookmarks_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct OfflineConfig {
    #[serde(default = "defaults::default_true")]
    offline_enabled: bool,
    #[serde(default = "defaults::default_true")]
    preload_enabled: bool,
    #[serde(default = "defaults::default_durable_cache_dir")]
    durable_cache_dir: String,
    #[serde(default = "defaults::default_durable_cache_name")]
    durable_cache_name: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            offline_enabled: true,
            preload_enabled: true,
            durable_cache_dir: defaults::default_durable_cache_dir(),
            durable_cache_name: defaults::default_durable_cache_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct TelemetryConfig {
    #[serde(default = "defaults::default_telemetry_history")]
    telemetry_history: usize,
    #[serde(default = "defaults::default_true")]
    telemetry_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            telemetry_history: defaults::default_telemetry_history(),
            telemetry_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}
