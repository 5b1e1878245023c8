//! TTL-wrapped cache entry

use std::time::{Duration, Instant};

/// A cached value with its insertion time and namespace TTL.
///
/// Entries are owned exclusively by the cache; callers always receive
/// clones of the value, never references into the map.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}
