use serde::{Deserialize, Serialize};

/// A cache entry containing a value and its expiration stamps.
///
/// Entries are stamped by the engine at write time from the cache's active
/// expiration policy; stores only read the stamps. An entry with neither
/// deadline nor sliding window never expires on its own and lives until it
/// is overwritten, removed, or invalidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in milliseconds at which the entry was written.
    pub inserted_at: i64,

    /// Unix timestamp in milliseconds past which the entry must not be
    /// returned. `None` means no deadline.
    pub expires_at: Option<i64>,

    /// Sliding idle window in milliseconds. When set, every successful read
    /// pushes `expires_at` out to now + window.
    pub sliding_ms: Option<i64>,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry stamped at `now`.
    pub fn new(value: V, now: i64, expires_at: Option<i64>, sliding_ms: Option<i64>) -> Self {
        CacheEntry {
            value,
            inserted_at: now,
            expires_at,
            sliding_ms,
        }
    }

    /// Check whether the entry is past its deadline.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(at) => now_ms >= at,
            None => false,
        }
    }

    /// Push the deadline out by the sliding window, if one is configured.
    /// Stores call this on read so idle entries age out while hot ones live.
    pub fn touch(&mut self, now_ms: i64) {
        if let Some(window) = self.sliding_ms {
            self.expires_at = Some(now_ms + window);
        }
    }
}

/// A value paired with the wall-clock time it was computed, as stored by the
/// scoped cache engine.
///
/// Staleness is judged per read against the ambient minimum timestamp: an
/// older value is treated as a miss without being evicted, so a later reader
/// with a laxer minimum can still use it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedValue<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in milliseconds at which the value was computed.
    pub timestamp: i64,
}

impl<V> ScopedValue<V> {
    /// Create a scoped value computed at `timestamp`.
    pub fn new(value: V, timestamp: i64) -> Self {
        ScopedValue { value, timestamp }
    }

    /// Check whether the value is recent enough for a reader demanding
    /// `minimum_timestamp`.
    pub fn satisfies(&self, minimum_timestamp: i64) -> bool {
        self.timestamp >= minimum_timestamp
    }
}
