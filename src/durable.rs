//! Durable, network-independent key/value cache.
//!
//! Modeled on a request/response cache: a store is opened by name and each
//! handle maps URL-like keys to stored responses. `FsDurableCache` keeps one
//! directory per cache name; every entry is a raw body file plus a small TOML
//! metadata file, both named by the SHA-256 of the key.

use crate::error::{ViewerError, ViewerResult};
use crate::telemetry::unix_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at_ms: u64,
}

impl CachedResponse {
    pub fn new(key: impl Into<String>, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            content_type,
            body,
            stored_at_ms: unix_millis(),
        }
    }

    pub fn text(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(
            key,
            Some("text/html; charset=utf-8".to_string()),
            body.into().into_bytes(),
        )
    }

    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[async_trait]
pub trait CacheHandle: Send + Sync {
    async fn put(&self, key: &str, response: CachedResponse) -> ViewerResult<()>;
    async fn match_key(&self, key: &str) -> ViewerResult<Option<CachedResponse>>;
    async fn keys(&self) -> ViewerResult<Vec<String>>;
}

#[async_trait]
pub trait DurableCache: Send + Sync {
    async fn open(&self, cache_name: &str) -> ViewerResult<Arc<dyn CacheHandle>>;
}

#[derive(Default)]
pub struct MemoryDurableCache {
    caches: Mutex<HashMap<String, Arc<MemoryCacheHandle>>>,
}

impl MemoryDurableCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableCache for MemoryDurableCache {
    async fn open(&self, cache_name: &str) -> ViewerResult<Arc<dyn CacheHandle>> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = caches
            .entry(cache_name.to_string())
            .or_insert_with(|| Arc::new(MemoryCacheHandle::default()))
            .clone();
        Ok(handle)
    }
}

#[derive(Default)]
pub struct MemoryCacheHandle {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

#[async_trait]
impl CacheHandle for MemoryCacheHandle {
    async fn put(&self, key: &str, response: CachedResponse) -> ViewerResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn match_key(&self, key: &str) -> ViewerResult<Option<CachedResponse>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn keys(&self) -> ViewerResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

pub struct FsDurableCache {
    root: PathBuf,
}

impl FsDurableCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DurableCache for FsDurableCache {
    async fn open(&self, cache_name: &str) -> ViewerResult<Arc<dyn CacheHandle>> {
        let dir = self.root.join(sanitize_cache_name(cache_name));
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened durable cache");
        Ok(Arc::new(FsCacheHandle { dir }))
    }
}

pub struct FsCacheHandle {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    content_type: Option<String>,
    stored_at_ms: u64,
    body_len: u64,
}

impl FsCacheHandle {
    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let stem = key_digest(key);
        (
            self.dir.join(format!("{stem}.body")),
            self.dir.join(format!("{stem}.meta.toml")),
        )
    }
}

#[async_trait]
impl CacheHandle for FsCacheHandle {
    async fn put(&self, key: &str, response: CachedResponse) -> ViewerResult<()> {
        let (body_path, meta_path) = self.entry_paths(key);
        let meta = EntryMeta {
            key: key.to_string(),
            content_type: response.content_type.clone(),
            stored_at_ms: response.stored_at_ms,
            body_len: response.body.len() as u64,
        };
        let meta_toml = toml::to_string(&meta).map_err(|err| ViewerError::CacheWrite {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        // Body first: a reader only trusts an entry once its metadata exists.
        tokio::fs::write(&body_path, &response.body).await?;
        tokio::fs::write(&meta_path, meta_toml).await?;
        Ok(())
    }

    async fn match_key(&self, key: &str) -> ViewerResult<Option<CachedResponse>> {
        let (body_path, meta_path) = self.entry_paths(key);
        let meta_str = match tokio::fs::read_to_string(&meta_path).await {
            Ok(value) => value,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let meta: EntryMeta = match toml::from_str(&meta_str) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %meta_path.display(), "Ignoring corrupt cache metadata: {err}");
                return Ok(None);
            }
        };
        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if body.len() as u64 != meta.body_len {
            warn!(key, "Cache entry body length mismatch; treating as absent");
            return Ok(None);
        }
        Ok(Some(CachedResponse {
            key: meta.key,
            content_type: meta.content_type,
            body,
            stored_at_ms: meta.stored_at_ms,
        }))
    }

    async fn keys(&self) -> ViewerResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_meta_file(&path) {
                continue;
            }
            let Ok(contents) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if let Ok(meta) = toml::from_str::<EntryMeta>(&contents) {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_meta_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".meta.toml"))
}

fn sanitize_cache_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        "default".to_string()
    } else {
        cleaned
    }
}
