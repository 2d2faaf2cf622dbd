use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Backstop time-to-live enforced by Moka itself, independent of the
    /// per-entry stamps. `None` leaves eviction to capacity and stamps.
    pub time_to_live: Option<Duration>,

    /// Backstop time-to-idle enforced by Moka itself.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

/// High-performance concurrent store using Moka.
///
/// Lock-free concurrent reads and writes with automatic background
/// eviction. Prefer this over `MemoryStore` for high concurrency (>8
/// threads) or large cache sizes (>10,000 items).
pub struct MokaStore<V>
where
    V: Clone + Send + Sync,
{
    cache: Cache<String, CacheEntry<V>>,
}

impl<V> MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new MokaStore with the given configuration.
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }
}

impl<V> Default for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        MokaStore::new(MokaStoreConfig::default())
    }
}

#[async_trait]
impl<V> Store<V> for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError> {
        match self.cache.get(key).await {
            Some(entry) => {
                let now = now_ms();

                if entry.is_expired(now) {
                    // Entry is expired, remove it
                    self.cache.invalidate(key).await;
                    return Ok(None);
                }

                if entry.sliding_ms.is_some() {
                    // Moka values are immutable; renew by re-inserting
                    let mut renewed = entry.clone();
                    renewed.touch(now);
                    self.cache.insert(key.to_string(), renewed).await;
                }

                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError> {
        // Moka handles capacity eviction automatically
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }
}
