//! Page-content resolvers.
//!
//! A resolver turns a 1-based page number into page content. Resolvers must
//! be idempotent: cache misses call them again for the same page.

use crate::durable::CacheHandle;
use crate::error::ResolveError;
use crate::offline::page_key;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait PageResolver: Send + Sync {
    async fn resolve(&self, page: u32) -> Result<String, ResolveError>;
}

/// Serves pages from an in-memory page array.
pub struct BookPagesResolver {
    pages: Arc<[String]>,
}

impl BookPagesResolver {
    pub fn new(pages: impl Into<Arc<[String]>>) -> Self {
        Self {
            pages: pages.into(),
        }
    }

    pub fn total_pages(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }
}

#[async_trait]
impl PageResolver for BookPagesResolver {
    async fn resolve(&self, page: u32) -> Result<String, ResolveError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .cloned()
            .ok_or_else(|| ResolveError::new(page, "page out of range"))
    }
}

/// Reads pages previously stored by the offline bridge.
pub struct DurablePageResolver {
    cache: Arc<dyn CacheHandle>,
    book_id: String,
}

impl DurablePageResolver {
    pub fn new(cache: Arc<dyn CacheHandle>, book_id: impl Into<String>) -> Self {
        Self {
            cache,
            book_id: book_id.into(),
        }
    }
}

#[async_trait]
impl PageResolver for DurablePageResolver {
    async fn resolve(&self, page: u32) -> Result<String, ResolveError> {
        let index = page
            .checked_sub(1)
            .ok_or_else(|| ResolveError::new(page, "page out of range"))?;
        let key = page_key(&self.book_id, index as usize);
        let cached = self
            .cache
            .match_key(&key)
            .await
            .map_err(|err| ResolveError::new(page, err.to_string()))?
            .ok_or_else(|| ResolveError::new(page, format!("{key} is not cached")))?;
        cached
            .body_text()
            .map(str::to_string)
            .ok_or_else(|| ResolveError::new(page, "cached page is not valid UTF-8"))
    }
}

/// Tries `primary` first and consults `fallback` when it fails.
pub struct FallbackResolver {
    primary: Arc<dyn PageResolver>,
    fallback: Arc<dyn PageResolver>,
}

impl FallbackResolver {
    pub fn new(primary: Arc<dyn PageResolver>, fallback: Arc<dyn PageResolver>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PageResolver for FallbackResolver {
    async fn resolve(&self, page: u32) -> Result<String, ResolveError> {
        match self.primary.resolve(page).await {
            Ok(content) => Ok(content),
            Err(err) => {
                debug!(page, "Primary resolver failed, trying fallback: {err}");
                self.fallback.resolve(page).await
            }
        }
    }
}

/// Adapts an async closure into a resolver.
pub struct FnResolver<F> {
    resolve: F,
}

impl<F, Fut> FnResolver<F>
where
    F: Fn(u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ResolveError>> + Send + 'static,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

#[async_trait]
impl<F, Fut> PageResolver for FnResolver<F>
where
    F: Fn(u32) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ResolveError>> + Send + 'static,
{
    async fn resolve(&self, page: u32) -> Result<String, ResolveError> {
        (self.resolve)(page).await
    }
}
