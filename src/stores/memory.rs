use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should
    /// run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than
    /// `max_items`.
    pub max_items: usize,
}

/// Configuration for MemoryStore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Remove expired entries (and trim to `max_items`) on `set` operations.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Thread-safe in-memory store over a HashMap.
///
/// Reads take a non-suspending shared lock, so the cache hit path never
/// awaits here. Suitable for moderate concurrency and cache sizes; for
/// high-churn workloads consider `MokaStore` instead.
pub struct MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    state: RwLock<HashMap<String, CacheEntry<V>>>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    /// Create a new MemoryStore with the given configuration.
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Run eviction if configured and the frequency check passes.
    fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = config.frequency >= 1.0 || rand::random::<f64>() < config.frequency;
        if !should_evict {
            return;
        }

        let mut state = self.state.write();
        let now = now_ms();

        // First delete all expired entries
        state.retain(|_, entry| !entry.is_expired(now));

        // If still over max_items, remove oldest writes first
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state
                .iter()
                .map(|(k, entry)| (k.clone(), entry.inserted_at))
                .collect();
            entries.sort_by_key(|(_, inserted_at)| *inserted_at);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }

    /// Remove `key` if the entry currently stored under it is expired.
    ///
    /// `try_get` decides expiry on a clone taken under the read lock, so a
    /// concurrent `set` can slip in before the write lock is held here.
    /// Re-checking the live entry keeps that fresh write from being dropped.
    fn remove_if_expired(&self, key: &str, now: i64) {
        let mut state = self.state.write();
        if state.get(key).is_some_and(|live| live.is_expired(now)) {
            state.remove(key);
        }
    }
}

impl<V> Default for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        MemoryStore::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError> {
        let now = now_ms();
        let (entry, renew) = {
            let state = self.state.read();
            match state.get(key) {
                None => return Ok(None),
                Some(entry) => (entry.clone(), entry.sliding_ms.is_some()),
            }
        };

        if entry.is_expired(now) {
            self.remove_if_expired(key, now);
            return Ok(None);
        }

        if renew {
            let mut state = self.state.write();
            if let Some(live) = state.get_mut(key) {
                live.touch(now);
            }
        }

        Ok(Some(entry))
    }

    async fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError> {
        self.state.write().insert(key.to_string(), entry);
        self.maybe_evict();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.state.write().remove(key);
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), CacheError> {
        // Discard the whole map rather than draining it item by item
        *self.state.write() = HashMap::new();
        Ok(())
    }
}
