//! Core of a paged book viewer: debounced navigation over a windowed page
//! cache, background preloading of neighbours, offline-first book caching and
//! device-aware layout profiles.

pub mod bindings;
pub mod book;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod durable;
pub mod error;
pub mod network;
pub mod offline;
pub mod pagination;
pub mod preload;
pub mod profile;
pub mod resolver;
pub mod telemetry;
pub mod viewer;

pub use config::ViewerConfig;
pub use error::{ViewerError, ViewerResult};
pub use viewer::{ViewerCommand, ViewerPhase, ViewerSession, ViewerSnapshot};
