//! Configuration loading for the page viewer.
//!
//! All tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! defaults so a viewer session can always open.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{Capabilities, LogLevel, ViewerConfig};
