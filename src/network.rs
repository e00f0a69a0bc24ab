//! Network-first reads with durable-cache fallback.
//!
//! A successful fetch is written through to the durable cache; a failed one
//! falls back to the cached copy, and when there is none the caller gets a
//! structured offline notice instead of an error.

use crate::durable::{CacheHandle, CachedResponse};
use crate::error::{FetchError, ViewerError, ViewerResult};
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ts_rs::TS;

pub const OFFLINE_MESSAGE: &str = "This feature is unavailable offline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResource {
    fn into_cached(self) -> CachedResponse {
        CachedResponse::new(self.url, self.content_type, self.body)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError>;
}

/// `reqwest`-backed GET fetcher.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        let parsed = parse_url(url)?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|err| FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|err| FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(FetchedResource {
            url: url.to_string(),
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

pub fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|err| FetchError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct OfflineNotice {
    pub error: String,
    pub message: String,
    pub url: String,
}

impl OfflineNotice {
    pub fn for_url(url: &str) -> Self {
        Self {
            error: "offline".to_string(),
            message: OFFLINE_MESSAGE.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Network(FetchedResource),
    Cached(CachedResponse),
    Offline(OfflineNotice),
}

impl FetchOutcome {
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            FetchOutcome::Network(resource) => Some(&resource.body),
            FetchOutcome::Cached(response) => Some(&response.body),
            FetchOutcome::Offline(_) => None,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, FetchOutcome::Offline(_))
    }

    /// Body bytes, or `ViewerError::OfflineFetch` when nothing was available.
    pub fn into_body(self) -> ViewerResult<Vec<u8>> {
        match self {
            FetchOutcome::Network(resource) => Ok(resource.body),
            FetchOutcome::Cached(response) => Ok(response.body),
            FetchOutcome::Offline(notice) => Err(ViewerError::OfflineFetch { url: notice.url }),
        }
    }
}

pub struct OfflineFirstClient {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn CacheHandle>,
}

impl OfflineFirstClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn CacheHandle>) -> Self {
        Self { fetcher, cache }
    }

    pub async fn get(&self, url: &str) -> FetchOutcome {
        match self.fetcher.fetch(url).await {
            Ok(resource) => {
                if let Err(err) = self.cache.put(url, resource.clone().into_cached()).await {
                    warn!(url, "Failed to write response through to durable cache: {err}");
                }
                FetchOutcome::Network(resource)
            }
            Err(fetch_err) => {
                debug!(url, "Network fetch failed, checking durable cache: {fetch_err}");
                match self.cache.match_key(url).await {
                    Ok(Some(cached)) => {
                        info!(url, "Serving durable cache entry after fetch failure");
                        FetchOutcome::Cached(cached)
                    }
                    Ok(None) => FetchOutcome::Offline(OfflineNotice::for_url(url)),
                    Err(cache_err) => {
                        warn!(url, "Durable cache lookup failed: {cache_err}");
                        FetchOutcome::Offline(OfflineNotice::for_url(url))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies; anything else fails like a dropped connection.
    #[derive(Default)]
    pub struct StubFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            Self {
                bodies: entries
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(url.to_string());
            parse_url(url)?;
            match self.bodies.get(url) {
                Some(body) => Ok(FetchedResource {
                    url: url.to_string(),
                    status: 200,
                    content_type: None,
                    body: body.clone(),
                }),
                None => Err(FetchError::Network {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;
    use crate::durable::MemoryCacheHandle;

    #[tokio::test]
    async fn fetch_failure_falls_back_to_cached_entry() {
        let url = "https://example.com/book/7/page/2";
        let cache = Arc::new(MemoryCacheHandle::default());
        let prior = CachedResponse::text(url, "<p>cached page</p>");
        cache.put(url, prior.clone()).await.expect("seed cache");

        let client = OfflineFirstClient::new(Arc::new(StubFetcher::default()), cache);
        let outcome = client.get(url).await;
        assert_eq!(outcome, FetchOutcome::Cached(prior.clone()));
        assert_eq!(outcome.body(), Some(prior.body.as_slice()));
    }

    #[tokio::test]
    async fn miss_while_offline_returns_notice() {
        let url = "https://example.com/reports";
        let client = OfflineFirstClient::new(
            Arc::new(StubFetcher::default()),
            Arc::new(MemoryCacheHandle::default()),
        );
        let outcome = client.get(url).await;
        assert!(outcome.is_offline());
        assert_eq!(outcome, FetchOutcome::Offline(OfflineNotice::for_url(url)));
        let json = match outcome {
            FetchOutcome::Offline(notice) => serde_json::to_value(notice).expect("serialize"),
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(json["error"], "offline");

        let err = client.get(url).await.into_body().expect_err("nothing cached");
        assert!(matches!(err, ViewerError::OfflineFetch { url: ref missing } if missing == url));
    }

    #[tokio::test]
    async fn successful_fetch_is_written_through() {
        let url = "https://example.com/a.css";
        let cache = Arc::new(MemoryCacheHandle::default());
        let client = OfflineFirstClient::new(
            Arc::new(StubFetcher::with(&[(url, "body{}")])),
            cache.clone(),
        );
        assert!(matches!(client.get(url).await, FetchOutcome::Network(_)));
        let stored = cache.match_key(url).await.expect("match").expect("stored");
        assert_eq!(stored.body_text(), Some("body{}"));
    }

    #[test]
    fn invalid_urls_are_rejected_before_any_request() {
        assert!(matches!(
            parse_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(parse_url("https://example.com/x.png").is_ok());
    }
}
