//! Error taxonomy for the viewer core.
//!
//! Only active-path failures ever reach a caller as a `Result`; background
//! work (neighbour preloads, single-asset offline caching) logs and contains
//! its own failures.

use thiserror::Error;

/// Failure produced by a page resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to resolve page {page}: {message}")]
pub struct ResolveError {
    pub page: u32,
    pub message: String,
}

impl ResolveError {
    pub fn new(page: u32, message: impl Into<String>) -> Self {
        Self {
            page,
            message: message.into(),
        }
    }
}

/// Failure produced by a network fetcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("cannot navigate to page {target} (current {current_page}, total {total_pages})")]
    InvalidNavigation {
        target: u32,
        current_page: u32,
        total_pages: u32,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("durable cache write for {key} failed: {message}")]
    CacheWrite { key: String, message: String },
    #[error("{url} is unavailable offline")]
    OfflineFetch { url: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ViewerResult<T> = Result<T, ViewerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_error_converts_into_viewer_error() {
        let err: ViewerError = ResolveError::new(4, "boom").into();
        assert_eq!(err.to_string(), "failed to resolve page 4: boom");
    }

    #[test]
    fn invalid_navigation_names_bounds() {
        let err = ViewerError::InvalidNavigation {
            target: 0,
            current_page: 1,
            total_pages: 15,
        };
        assert_eq!(
            err.to_string(),
            "cannot navigate to page 0 (current 1, total 15)"
        );
    }
}
