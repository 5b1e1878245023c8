//! Namespaced in-process cache with governor-gated admission
//!
//! Four namespaces, each with its own TTL policy: fetch results (keyed
//! by cache key), placeholder verdicts and brightness analyses (keyed
//! by content hash), and inverted-image buffers (LRU-bounded). Writes
//! consult the memory pressure governor; reads never fail under
//! pressure, they just miss.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::memory::MemoryPressureGovernor;
use crate::models::{
    BrightnessAnalysis, CacheStats, FetchResult, MemoryHealthState, ValidationVerdict,
};

use super::entry::CacheEntry;

/// Artifact namespaces, for targeted `clear` calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    FetchResults,
    Verdicts,
    Brightness,
    Inverted,
}

/// One TTL-scoped map with hit/miss bookkeeping
struct Namespace<T: Clone> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    ttl: Duration,
    max_entries: usize,
    estimate: fn(&T) -> usize,
}

impl<T: Clone> Namespace<T> {
    fn new(ttl: Duration, max_entries: usize, estimate: fn(&T) -> usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl,
            max_entries,
            estimate,
        }
    }

    async fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        // Expired: remove under the write lock and report a miss.
        self.entries.write().await.remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn set(&self, key: &str, value: T) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            evict_oldest(&mut entries);
        }
        entries.insert(key.to_string(), CacheEntry::new(value, self.ttl));
    }

    async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn approx_bytes(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().map(|e| (self.estimate)(&e.value)).sum()
    }
}

fn evict_oldest<T>(entries: &mut HashMap<String, CacheEntry<T>>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.inserted_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

/// Inverted-image buffers, LRU-bounded on top of the TTL policy
struct InvertedNamespace {
    entries: Mutex<LruCache<String, CacheEntry<Bytes>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    ttl: Duration,
}

impl InvertedNamespace {
    fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes) {
        self.entries
            .lock()
            .await
            .put(key.to_string(), CacheEntry::new(value, self.ttl));
    }

    async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn approx_bytes(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.iter().map(|(_, e)| e.value.len()).sum()
    }
}

/// Rough in-memory footprint of the fixed-size analysis structs
const STRUCT_ESTIMATE: usize = 128;

pub struct LogoCacheHierarchy {
    fetch_results: Namespace<FetchResult>,
    verdicts: Namespace<ValidationVerdict>,
    brightness: Namespace<BrightnessAnalysis>,
    inverted: InvertedNamespace,
    governor: Arc<MemoryPressureGovernor>,
}

impl LogoCacheHierarchy {
    pub fn new(config: &CacheConfig, governor: Arc<MemoryPressureGovernor>) -> Self {
        Self {
            fetch_results: Namespace::new(
                config.fetch_result_ttl,
                config.max_entries_per_namespace,
                |r: &FetchResult| r.buffer_len() + STRUCT_ESTIMATE,
            ),
            verdicts: Namespace::new(
                config.verdict_ttl,
                config.max_entries_per_namespace,
                |_| STRUCT_ESTIMATE,
            ),
            brightness: Namespace::new(
                config.brightness_ttl,
                config.max_entries_per_namespace,
                |_| STRUCT_ESTIMATE,
            ),
            inverted: InvertedNamespace::new(config.inverted_ttl, config.inverted_capacity),
            governor,
        }
    }

    /// Admission check shared by every namespace: rejected outright
    /// under critical pressure, admitted with opportunistic eviction
    /// under warning.
    async fn admit(&self) -> bool {
        match self.governor.state() {
            MemoryHealthState::Critical => {
                debug!("Cache write rejected under critical memory pressure");
                false
            }
            MemoryHealthState::Warning => {
                self.evict_expired().await;
                true
            }
            MemoryHealthState::Healthy => true,
        }
    }

    pub async fn get_fetch_result(&self, key: &str) -> Option<FetchResult> {
        self.fetch_results.get(key).await
    }

    pub async fn set_fetch_result(&self, key: &str, result: FetchResult) -> bool {
        if !self.admit().await {
            return false;
        }
        self.fetch_results.set(key, result).await;
        true
    }

    pub async fn get_verdict(&self, content_hash: &str) -> Option<ValidationVerdict> {
        self.verdicts.get(content_hash).await
    }

    pub async fn set_verdict(&self, content_hash: &str, verdict: ValidationVerdict) -> bool {
        if !self.admit().await {
            return false;
        }
        self.verdicts.set(content_hash, verdict).await;
        true
    }

    pub async fn get_brightness(&self, content_hash: &str) -> Option<BrightnessAnalysis> {
        self.brightness.get(content_hash).await
    }

    pub async fn set_brightness(&self, content_hash: &str, analysis: BrightnessAnalysis) -> bool {
        if !self.admit().await {
            return false;
        }
        self.brightness.set(content_hash, analysis).await;
        true
    }

    pub async fn get_inverted(&self, content_hash: &str) -> Option<Bytes> {
        self.inverted.get(content_hash).await
    }

    pub async fn set_inverted(&self, content_hash: &str, buffer: Bytes) -> bool {
        if !self.admit().await {
            return false;
        }
        self.inverted.set(content_hash, buffer).await;
        true
    }

    /// Clear one namespace, or all of them.
    pub async fn clear(&self, namespace: Option<CacheNamespace>) -> usize {
        match namespace {
            Some(CacheNamespace::FetchResults) => self.fetch_results.clear().await,
            Some(CacheNamespace::Verdicts) => self.verdicts.clear().await,
            Some(CacheNamespace::Brightness) => self.brightness.clear().await,
            Some(CacheNamespace::Inverted) => self.inverted.clear().await,
            None => {
                self.fetch_results.clear().await
                    + self.verdicts.clear().await
                    + self.brightness.clear().await
                    + self.inverted.clear().await
            }
        }
    }

    /// Drop expired entries from every namespace.
    pub async fn evict_expired(&self) -> usize {
        self.fetch_results.evict_expired().await
            + self.verdicts.evict_expired().await
            + self.brightness.evict_expired().await
            + self.inverted.evict_expired().await
    }

    /// Emergency cleanup hook for the pressure governor: clears the
    /// namespace currently holding the most bytes.
    pub async fn shed_largest_namespace(&self) -> usize {
        let sized = [
            (CacheNamespace::FetchResults, self.fetch_results.approx_bytes().await),
            (CacheNamespace::Verdicts, self.verdicts.approx_bytes().await),
            (CacheNamespace::Brightness, self.brightness.approx_bytes().await),
            (CacheNamespace::Inverted, self.inverted.approx_bytes().await),
        ];
        let Some(&(largest, bytes)) = sized.iter().max_by_key(|(_, bytes)| *bytes) else {
            return 0;
        };
        if bytes == 0 {
            return 0;
        }
        let dropped = self.clear(Some(largest)).await;
        info!(
            "Shed {:?} cache namespace under memory pressure ({} entries, ~{} bytes)",
            largest, dropped, bytes
        );
        dropped
    }

    pub async fn stats(&self) -> CacheStats {
        let entry_count = (self.fetch_results.len().await
            + self.verdicts.len().await
            + self.brightness.len().await
            + self.inverted.len().await) as u64;

        let hit_count = self.fetch_results.hits.load(Ordering::Relaxed)
            + self.verdicts.hits.load(Ordering::Relaxed)
            + self.brightness.hits.load(Ordering::Relaxed)
            + self.inverted.hits.load(Ordering::Relaxed);

        let miss_count = self.fetch_results.misses.load(Ordering::Relaxed)
            + self.verdicts.misses.load(Ordering::Relaxed)
            + self.brightness.misses.load(Ordering::Relaxed)
            + self.inverted.misses.load(Ordering::Relaxed);

        CacheStats {
            entry_count,
            hit_count,
            miss_count,
        }
    }
}
