use super::models::ViewerConfig;
use super::tables::ConfigTables;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load the config file, falling back to defaults when it is missing or
/// malformed so the viewer can always start.
pub fn load_config(path: &Path) -> ViewerConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return ViewerConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            ViewerConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<ViewerConfig> {
    let tables: ConfigTables =
        toml::from_str(contents).context("Failed to parse viewer config tables")?;
    Ok(ViewerConfig::from(tables).normalized())
}

pub fn serialize_config(config: &ViewerConfig) -> Result<String> {
    toml::to_string_pretty(&ConfigTables::from(config)).context("Failed to serialize viewer config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = parse_config(include_str!("../../conf/config.toml")).expect("shipped config");
        assert_eq!(cfg, ViewerConfig::default());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").expect("empty config parses");
        assert_eq!(cfg, ViewerConfig::default());
    }

    #[test]
    fn tables_map_onto_flat_config() {
        let cfg = parse_config(
            r#"
            [navigation]
            debounce_ms = 250

            [cache]
            window = 2
            capacity = 12

            [ui]
            bookmarks_enabled = false

            [logging]
            log_level = "warn"
            "#,
        )
        .expect("valid config");
        assert_eq!(cfg.debounce_ms, 250);
        assert_eq!(cfg.cache_window, 2);
        assert_eq!(cfg.cache_capacity, 12);
        assert!(!cfg.bookmarks_enabled);
        assert!(!cfg.capabilities().bookmarks);
        assert_eq!(cfg.log_level, LogLevel::Warn);
        assert_eq!(cfg.max_zoom, 300);
    }

    #[test]
    fn out_of_range_values_are_normalized() {
        let cfg = parse_config(
            r#"
            [navigation]
            min_zoom = 0
            max_zoom = 0
            zoom_step = 0
            initial_zoom = 500

            [cache]
            window = 0
            capacity = 1
            pressure_ratio = 3.0
            "#,
        )
        .expect("valid config");
        assert_eq!(cfg.min_zoom, 1);
        assert_eq!(cfg.max_zoom, 1);
        assert_eq!(cfg.zoom_step, 1);
        assert_eq!(cfg.initial_zoom, 1);
        assert_eq!(cfg.cache_window, 1);
        assert_eq!(cfg.cache_capacity, 3);
        assert!((cfg.pressure_ratio - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut cfg = ViewerConfig::default();
        cfg.debounce_ms = 40;
        cfg.durable_cache_name = "books".to_string();
        let text = serialize_config(&cfg).expect("serializes");
        assert!(text.contains("[navigation]"));
        assert_eq!(parse_config(&text).expect("parses"), cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&dir.path().join("absent.toml"));
        assert_eq!(cfg, ViewerConfig::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\nwindow = ").expect("write config");
        assert_eq!(load_config(&path), ViewerConfig::default());
    }
}
