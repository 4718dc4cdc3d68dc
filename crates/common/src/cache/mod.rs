//! Two-tier response cache
//!
//! Provides:
//! - Bounded in-memory LRU tier checked first
//! - Unbounded on-disk JSON tier, repopulating memory on hit
//! - Per-entry TTL with pruning on read
//! - Atomic replace on write (temp file + rename)
//!
//! Tier failures degrade to memory-only operation and are logged; no cache
//! operation ever returns an error to the caller.

use crate::config::CacheSettings;
use crate::metrics;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries kept in memory
    pub memory_capacity: usize,
    /// Disk tier directory; `None` runs memory-only
    pub disk_dir: Option<PathBuf>,
    /// TTL used by `set`
    pub default_ttl: Duration,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 512,
            disk_dir: None,
            default_ttl: Duration::from_secs(300),
            key_prefix: "clinsight".to_string(),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            memory_capacity: settings.memory_capacity,
            disk_dir: settings.disk_dir.clone(),
            default_ttl: settings.result_ttl(),
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

/// One stored value. Entries are immutable; a write replaces the whole entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct DiskTier {
    dir: PathBuf,
    seq: AtomicU64,
    /// Write version of the file currently on disk per key.
    /// Renames and removes for a key happen under this lock in version order.
    committed: Mutex<HashMap<String, u64>>,
}

impl DiskTier {
    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn read(&self, key: &str) -> std::io::Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cache file");
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    /// Write `entry` as `version`.
    ///
    /// Returns `Ok(false)` when a newer version already landed, in which case
    /// the file on disk is left alone.
    async fn write(&self, entry: &CacheEntry, version: u64) -> std::io::Result<bool> {
        let path = self.path_for(&entry.key);
        let bytes = serde_json::to_vec(entry)?;
        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&tmp, &bytes).await?;

        let mut committed = self.committed.lock().await;
        if committed.get(&entry.key).is_some_and(|&current| current > version) {
            drop(committed);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Ok(false);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            drop(committed);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        committed.insert(entry.key.clone(), version);
        Ok(true)
    }

    /// Remove `key` as `version`; an older removal never deletes a newer write.
    async fn remove(&self, key: &str, version: u64) -> std::io::Result<()> {
        let mut committed = self.committed.lock().await;
        if committed.get(key).is_some_and(|&current| current > version) {
            return Ok(());
        }
        remove_file_if_present(&self.path_for(key)).await?;
        committed.insert(key.to_string(), version);
        Ok(())
    }

    /// Remove `key` only if the file still holds an expired entry.
    async fn remove_expired(&self, key: &str, now: DateTime<Utc>) -> std::io::Result<()> {
        let _committed = self.committed.lock().await;
        match self.read(key).await? {
            Some(entry) if !entry.is_expired(now) => Ok(()),
            _ => remove_file_if_present(&self.path_for(key)).await,
        }
    }
}

async fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Two-tier cache shared by all concurrent queries
pub struct Cache {
    memory: Mutex<LruCache<String, Arc<CacheEntry>>>,
    disk: Option<DiskTier>,
    /// Keys whose last disk write failed; retried on shutdown
    dirty: Mutex<HashSet<String>>,
    /// Write version counter, advanced under the memory lock
    versions: AtomicU64,
    config: CacheConfig,
}

impl Cache {
    /// Create a cache, creating the disk directory if configured.
    ///
    /// A disk directory that cannot be created leaves the cache memory-only.
    pub async fn new(config: CacheConfig) -> Self {
        let disk = match &config.disk_dir {
            Some(dir) => match tokio::fs::create_dir_all(dir).await {
                Ok(()) => Some(DiskTier {
                    dir: dir.clone(),
                    seq: AtomicU64::new(0),
                    committed: Mutex::new(HashMap::new()),
                }),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Disk cache unavailable, running memory-only");
                    None
                }
            },
            None => None,
        };

        Self::with_disk(config, disk)
    }

    /// Memory-only cache
    pub fn in_memory(capacity: usize) -> Self {
        let config = CacheConfig {
            memory_capacity: capacity,
            ..CacheConfig::default()
        };
        Self::with_disk(config, None)
    }

    fn with_disk(config: CacheConfig, disk: Option<DiskTier>) -> Self {
        let capacity = NonZeroUsize::new(config.memory_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            disk,
            dirty: Mutex::new(HashSet::new()),
            versions: AtomicU64::new(0),
            config,
        }
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    pub fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }

    /// Next write version. Callers hold the memory lock so that memory order
    /// and version order agree.
    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn get_entry(&self, full_key: &str) -> Option<Arc<CacheEntry>> {
        let now = Utc::now();

        {
            let mut memory = self.memory.lock().await;
            if let Some(entry) = memory.get(full_key) {
                if !entry.is_expired(now) {
                    metrics::record_cache(true, "memory");
                    return Some(entry.clone());
                }
                memory.pop(full_key);
            }
        }
        metrics::record_cache(false, "memory");

        let disk = self.disk.as_ref()?;
        let entry = match disk.read(full_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::record_cache(false, "disk");
                return None;
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Disk cache read failed");
                metrics::record_cache(false, "disk");
                return None;
            }
        };

        if entry.is_expired(now) {
            debug!(key = %full_key, "Pruning expired disk entry");
            if let Err(e) = disk.remove_expired(full_key, now).await {
                warn!(key = %full_key, error = %e, "Failed to prune expired cache file");
            }
            metrics::record_cache(false, "disk");
            return None;
        }

        metrics::record_cache(true, "disk");
        let entry = Arc::new(entry);
        let mut memory = self.memory.lock().await;
        // A concurrent put may have landed while we were on disk; it is newer.
        if let Some(current) = memory.get(full_key) {
            return Some(current.clone());
        }
        memory.put(full_key.to_string(), entry.clone());
        Some(entry)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.key(key);
        let entry = self.get_entry(&full_key).await?;

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                debug!(key = %full_key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cached value has unexpected shape, invalidating");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.config.default_ttl).await
    }

    /// Set a value in cache with custom TTL, writing both tiers
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let full_key = self.key(key);
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Failed to serialize value, not caching");
                return;
            }
        };

        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = Arc::new(CacheEntry {
            key: full_key.clone(),
            value,
            expires_at,
        });

        let version = {
            let mut memory = self.memory.lock().await;
            memory.put(full_key.clone(), entry.clone());
            self.next_version()
        };

        if let Some(disk) = &self.disk {
            match disk.write(&entry, version).await {
                Ok(true) => {
                    self.dirty.lock().await.remove(&full_key);
                }
                Ok(false) => {
                    debug!(key = %full_key, version, "Newer disk write already landed");
                }
                Err(e) => {
                    warn!(key = %full_key, error = %e, "Disk cache write failed, kept in memory");
                    self.dirty.lock().await.insert(full_key.clone());
                }
            }
        }

        debug!(key = %full_key, ttl_secs = ttl.num_seconds(), "Cache set");
    }

    /// Remove a key from both tiers
    pub async fn invalidate(&self, key: &str) {
        let full_key = self.key(key);
        let version = {
            let mut memory = self.memory.lock().await;
            memory.pop(&full_key);
            self.next_version()
        };
        self.dirty.lock().await.remove(&full_key);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(&full_key, version).await {
                warn!(key = %full_key, error = %e, "Failed to remove cache file");
            }
        }
        debug!(key = %full_key, "Cache invalidate");
    }

    /// Get or set with a loader function.
    ///
    /// Loader errors propagate; cache failures never do.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = loader().await?;
        self.set_with_ttl(key, &value, ttl).await;
        Ok(value)
    }

    /// Remove expired entries from both tiers, returning how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        {
            let mut memory = self.memory.lock().await;
            let expired: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                memory.pop(&key);
                removed += 1;
            }
        }

        if let Some(disk) = &self.disk {
            removed += prune_dir(&disk.dir, now).await;
        }

        removed
    }

    /// Flush memory entries the disk tier missed, then clear memory.
    ///
    /// Returns the number of entries written during the flush.
    pub async fn shutdown(&self) -> usize {
        let now = Utc::now();
        let dirty: Vec<String> = self.dirty.lock().await.drain().collect();
        let mut flushed = 0;

        if let Some(disk) = &self.disk {
            let memory = self.memory.lock().await;
            for key in &dirty {
                let Some(entry) = memory.peek(key) else { continue };
                if entry.is_expired(now) {
                    continue;
                }
                match disk.write(entry, self.next_version()).await {
                    Ok(true) => flushed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %key, error = %e, "Dropping cache entry on shutdown"),
                }
            }
        }

        self.memory.lock().await.clear();
        info!(flushed, "Cache shut down");
        flushed
    }

    /// Number of entries currently held in memory
    pub async fn memory_len(&self) -> usize {
        self.memory.lock().await.len()
    }
}

async fn prune_dir(dir: &Path, now: DateTime<Utc>) -> usize {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot scan disk cache");
            return 0;
        }
    };

    while let Ok(Some(file)) = entries.next_entry().await {
        let path = file.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let expired = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .map(|entry| entry.is_expired(now))
                .unwrap_or(true),
            Err(_) => false,
        };
        if expired && tokio::fs::remove_file(&path).await.is_ok() {
            removed += 1;
        }
    }

    removed
}

/// Cache key builder helpers
pub mod keys {
    use crate::models::normalize_name;

    /// Key for one provider's records for a query
    pub fn provider_fetch(provider: &str, query: &str, limit: usize) -> String {
        format!("fetch:{}:{}:{}", provider, normalize_name(query), limit)
    }

    /// Key for a computed engine result about an entity
    pub fn engine_result(engine: &str, entity: &str) -> String {
        format!("{}:{}", engine, normalize_name(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    fn payload(name: &str, count: u32) -> Payload {
        Payload { name: name.to_string(), count }
    }

    async fn disk_cache(dir: &Path, capacity: usize) -> Cache {
        Cache::new(CacheConfig {
            memory_capacity: capacity,
            disk_dir: Some(dir.to_path_buf()),
            ..CacheConfig::default()
        })
        .await
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::provider_fetch("pubmed", "  Lung  Cancer ", 10), "fetch:pubmed:lung cancer:10");
        assert_eq!(keys::engine_result("graph", "KEYTRUDA"), "graph:keytruda");
    }

    #[tokio::test]
    async fn test_memory_roundtrip_and_invalidate() {
        let cache = Cache::in_memory(4);
        cache.set("a", &payload("a", 1)).await;

        assert_eq!(cache.get::<Payload>("a").await, Some(payload("a", 1)));
        cache.invalidate("a").await;
        assert_eq!(cache.get::<Payload>("a").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = Cache::in_memory(4);
        cache.set_with_ttl("short", &payload("s", 1), Duration::ZERO).await;
        assert_eq!(cache.get::<Payload>("short").await, None);
    }

    #[tokio::test]
    async fn test_lru_eviction_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = disk_cache(dir.path(), 1).await;

        cache.set("first", &payload("first", 1)).await;
        cache.set("second", &payload("second", 2)).await;
        assert_eq!(cache.memory_len().await, 1);

        // Evicted from memory, served from disk and promoted back
        assert_eq!(cache.get::<Payload>("first").await, Some(payload("first", 1)));
        assert_eq!(cache.memory_len().await, 1);
    }

    #[tokio::test]
    async fn test_disk_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = disk_cache(dir.path(), 8).await;
            cache.set("persisted", &payload("p", 7)).await;
            cache.shutdown().await;
        }

        let cache = disk_cache(dir.path(), 8).await;
        assert_eq!(cache.get::<Payload>("persisted").await, Some(payload("p", 7)));
    }

    #[tokio::test]
    async fn test_write_replaces_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = disk_cache(dir.path(), 8).await;

        cache.set("k", &payload("old", 1)).await;
        cache.set("k", &payload("new", 2)).await;
        assert_eq!(cache.get::<Payload>("k").await, Some(payload("new", 2)));

        let fresh = disk_cache(dir.path(), 8).await;
        assert_eq!(fresh.get::<Payload>("k").await, Some(payload("new", 2)));
    }

    #[tokio::test]
    async fn test_unusable_disk_dir_degrades_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let cache = disk_cache(&blocker, 8).await;
        assert!(!cache.has_disk_tier());

        cache.set("k", &payload("v", 1)).await;
        assert_eq!(cache.get::<Payload>("k").await, Some(payload("v", 1)));
    }

    #[tokio::test]
    async fn test_failed_disk_write_is_flushed_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = disk_cache(&cache_dir, 8).await;

        std::fs::remove_dir_all(&cache_dir).unwrap();
        cache.set("k", &payload("v", 1)).await;
        assert_eq!(cache.get::<Payload>("k").await, Some(payload("v", 1)));

        std::fs::create_dir_all(&cache_dir).unwrap();
        assert_eq!(cache.shutdown().await, 1);
        assert_eq!(cache.memory_len().await, 0);
        assert_eq!(cache.get::<Payload>("k").await, Some(payload("v", 1)));
    }

    #[tokio::test]
    async fn test_prune_expired_disk_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = disk_cache(dir.path(), 8).await;

        cache.set_with_ttl("gone", &payload("g", 1), Duration::ZERO).await;
        cache.set_with_ttl("kept", &payload("k", 1), Duration::from_secs(60)).await;

        assert_eq!(cache.prune_expired().await, 2);
        assert_eq!(cache.get::<Payload>("kept").await, Some(payload("k", 1)));
    }

    #[tokio::test]
    async fn test_get_or_load_caches_success_only() {
        let cache = Cache::in_memory(4);

        let loaded: Result<u32, String> = cache
            .get_or_load("n", Duration::from_secs(60), || async { Ok(5) })
            .await;
        assert_eq!(loaded, Ok(5));

        let again: Result<u32, String> = cache
            .get_or_load("n", Duration::from_secs(60), || async { Err("not called".to_string()) })
            .await;
        assert_eq!(again, Ok(5));

        let failed: Result<u32, String> = cache
            .get_or_load("m", Duration::from_secs(60), || async { Err("boom".to_string()) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.get::<u32>("m").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_mix_values() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(disk_cache(dir.path(), 8).await);

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set("shared", &payload(&format!("w{}", i), i)).await;
                cache.get::<Payload>("shared").await
            }));
        }

        for handle in handles {
            let seen = handle.await.unwrap().expect("value present");
            assert_eq!(seen.name, format!("w{}", seen.count));
        }

        let in_memory = cache.get::<Payload>("shared").await;
        let fresh = disk_cache(dir.path(), 8).await;
        assert_eq!(fresh.get::<Payload>("shared").await, in_memory);
    }

    #[tokio::test]
    async fn test_stale_disk_write_does_not_replace_newer() {
        let dir = tempfile::tempdir().unwrap();
        let cache = disk_cache(dir.path(), 8).await;
        cache.set("k", &payload("newer", 2)).await;

        // A write that was ordered first in memory but reaches the disk last
        let stale = CacheEntry {
            key: cache.key("k"),
            value: serde_json::to_value(payload("older", 1)).unwrap(),
            expires_at: Utc::now() + chrono::Duration::minutes(5),
        };
        let disk = cache.disk.as_ref().unwrap();
        assert!(!disk.write(&stale, 0).await.unwrap());

        let fresh = disk_cache(dir.path(), 8).await;
        assert_eq!(fresh.get::<Payload>("k").await, Some(payload("newer", 2)));
    }

    #[tokio::test]
    async fn test_stale_remove_keeps_newer_write() {
        let dir = tempfile::tempdir().unwrap();
        let cache = disk_cache(dir.path(), 8).await;
        cache.set("k", &payload("v", 1)).await;

        let disk = cache.disk.as_ref().unwrap();
        disk.remove(&cache.key("k"), 0).await.unwrap();

        let fresh = disk_cache(dir.path(), 8).await;
        assert_eq!(fresh.get::<Payload>("k").await, Some(payload("v", 1)));

        cache.invalidate("k").await;
        let fresh = disk_cache(dir.path(), 8).await;
        assert_eq!(fresh.get::<Payload>("k").await, None);
    }
}
