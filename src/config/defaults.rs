pub(crate) fn default_debounce_ms() -> u64 {
    100
}

pub(crate) fn default_min_zoom() -> u32 {
    25
}

pub(crate) fn default_max_zoom() -> u32 {
    300
}

pub(crate) fn default_zoom_step() -> u32 {
    25
}

pub(crate) fn default_initial_zoom() -> u32 {
    100
}

pub(crate) fn default_cache_window() -> u32 {
    3
}

pub(crate) fn default_cache_capacity() -> usize {
    20
}

pub(crate) fn default_pressure_check_secs() -> u64 {
    10
}

pub(crate) fn default_pressure_ratio() -> f32 {
    0.8
}

pub(crate) fn default_controls_hide_secs() -> u64 {
    3
}

pub(crate) fn default_orientation_settle_ms() -> u64 {
    100
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_durable_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_durable_cache_name() -> String {
    "pageleaf-offline-v1".to_string()
}

pub(crate) fn default_telemetry_history() -> usize {
    100
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
