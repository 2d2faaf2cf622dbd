use std::future::Future;
use std::sync::Arc;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::notifier::Notifier;
use crate::policy::{CachePolicy, ExpirationPolicy};
use crate::store::Store;
use crate::striped::StripedLock;
use crate::sync::CacheSynchronizer;
use crate::utils::now_ms;

/// Cache engine combining a backing store with striped-lock stampede
/// protection and optional cross-instance invalidation.
///
/// Reads (`get`) never touch the striped lock. Misses inside
/// `get_or_compute` acquire the key's slot, re-check the store, and only
/// then run the caller's compute, so concurrent misses on one key collapse
/// to a single computation per process.
///
/// `LocalCache` is cheap to clone; clones share the store, the lock and the
/// synchronizer.
pub struct LocalCache<V> {
    name: String,
    store: Arc<dyn Store<V>>,
    policy: CachePolicy,
    lock: Option<Arc<StripedLock>>,
    synchronizer: Option<Arc<CacheSynchronizer>>,
}

impl<V> Clone for LocalCache<V> {
    fn clone(&self) -> Self {
        LocalCache {
            name: self.name.clone(),
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
            lock: self.lock.clone(),
            synchronizer: self.synchronizer.clone(),
        }
    }
}

impl<V> LocalCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a standalone cache with no cross-instance synchronization.
    ///
    /// Fails when the policy does not validate, or when it names a sync
    /// provider: provider resolution happens in `CacheBuilder`, so a policy
    /// carrying `sync_provider` must be built through the builder.
    pub fn new(
        name: &str,
        store: Arc<dyn Store<V>>,
        policy: CachePolicy,
    ) -> Result<Self, CacheError> {
        policy.validate(now_ms(), false)?;
        if policy.sync_provider.is_some() {
            return Err(CacheError::configuration(
                "policy names a sync provider; construct this cache through CacheBuilder",
            ));
        }

        let lock = if policy.lock.enabled {
            Some(Arc::new(StripedLock::new(&policy.lock)?))
        } else {
            None
        };

        Ok(LocalCache {
            name: name.to_string(),
            store,
            policy,
            lock,
            synchronizer: None,
        })
    }

    /// Create a cache bound to a notifier for cross-instance invalidation.
    ///
    /// Subscribes before returning, so remote notifications start applying
    /// as soon as the cache exists. Explicit mutations (`set`, `remove`,
    /// `clear`) publish to the notifier; miss-path fills never do.
    pub async fn with_notifier(
        name: &str,
        store: Arc<dyn Store<V>>,
        policy: CachePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, CacheError> {
        policy.validate(now_ms(), true)?;

        let lock = if policy.lock.enabled {
            Some(Arc::new(StripedLock::new(&policy.lock)?))
        } else {
            None
        };

        let synchronizer = CacheSynchronizer::bind(
            name,
            notifier,
            Arc::clone(&store),
            policy.fallback_expiration.is_some(),
        )
        .await?;

        Ok(LocalCache {
            name: name.to_string(),
            store,
            policy,
            lock,
            synchronizer: Some(synchronizer),
        })
    }

    /// Name this cache was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The striped lock guarding miss-path fills, when locking is enabled.
    pub(crate) fn striped_lock(&self) -> Option<&Arc<StripedLock>> {
        self.lock.as_ref()
    }

    /// Return the cached value.
    ///
    /// A pure lookup: no locking, no computation, `None` on miss. Expired
    /// entries are treated as misses by the store.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.store.try_get(key).await?.map(|entry| entry.value))
    }

    /// Get the cached value, or compute and cache it on a miss.
    ///
    /// Hits return without touching the striped lock. On a miss the key's
    /// slot is acquired, the store is checked again (another caller may have
    /// filled it while we waited), and only then does `compute` run. When the
    /// slot wait times out with `throw_on_timeout` disabled the caller
    /// proceeds to compute without the lock, accepting a duplicate
    /// computation over an error.
    ///
    /// Compute failures propagate and cache nothing.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<V, CacheError>> + Send,
    {
        if let Some(entry) = self.store.try_get(key).await? {
            return Ok(entry.value);
        }

        let guard = match &self.lock {
            Some(lock) => lock.acquire(key).await?,
            None => None,
        };

        if guard.is_some() {
            // Double-check under the slot: a concurrent caller may have
            // stored the value while we waited.
            if let Some(entry) = self.store.try_get(key).await? {
                return Ok(entry.value);
            }
        }

        let value = compute(key.to_string()).await?;
        self.store_value(key, value.clone()).await?;

        drop(guard);
        Ok(value)
    }

    /// Set the value in the cache, overwriting any existing entry.
    ///
    /// Publishes an `Updated` notification when a notifier is bound.
    pub async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.store_value(key, value).await?;
        if let Some(sync) = &self.synchronizer {
            sync.publish_updated(key).await;
        }
        Ok(())
    }

    /// Remove the key from the cache.
    ///
    /// Publishes a `Removed` notification when a notifier is bound.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key).await?;
        if let Some(sync) = &self.synchronizer {
            sync.publish_removed(key).await;
        }
        Ok(())
    }

    /// Discard every entry in the cache.
    ///
    /// Publishes a `RemoveAll` notification when a notifier is bound.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.remove_all().await?;
        if let Some(sync) = &self.synchronizer {
            sync.publish_remove_all().await;
        }
        Ok(())
    }

    /// Stamp and store a value under the currently active expiration policy.
    pub(crate) async fn store_value(&self, key: &str, value: V) -> Result<(), CacheError> {
        let now = now_ms();
        let (expires_at, sliding_ms) = self.active_expiration().deadlines(now);
        let entry = CacheEntry::new(value, now, expires_at, sliding_ms);
        self.store.set(key, entry).await
    }

    /// The expiration policy in effect for writes happening now.
    ///
    /// Switches to the fallback policy while the synchronizer reports the
    /// sync provider unavailable, back to the primary once it recovers.
    fn active_expiration(&self) -> &ExpirationPolicy {
        match (&self.synchronizer, &self.policy.fallback_expiration) {
            (Some(sync), Some(fallback)) if sync.fallback_active() => fallback,
            _ => &self.policy.expiration,
        }
    }
}
