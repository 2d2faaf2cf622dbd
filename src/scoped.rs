use std::future::Future;
use std::sync::Arc;

use crate::cache::LocalCache;
use crate::directives::{CacheDirectives, MethodTaken, current_directives};
use crate::entry::ScopedValue;
use crate::error::CacheError;
use crate::notifier::Notifier;
use crate::policy::CachePolicy;
use crate::store::Store;

/// Cache engine whose reads and writes obey the ambient [`CacheDirectives`].
///
/// Every stored value carries the timestamp it was computed at; a read only
/// counts as a hit when the ambient directives permit `GET` and the stored
/// timestamp meets the scope's `minimum_timestamp`. Staleness is judged per
/// read: an entry one reader rejects as stale stays available to readers
/// with a laxer floor.
///
/// Each operation reports what it actually did as [`MethodTaken`] flags, so
/// callers can tell a directive-suppressed read from a genuine miss.
///
/// Layers on [`LocalCache`], so miss-path fills use the same striped-lock
/// double-checked discipline and mutations publish the same invalidations.
pub struct ScopedCache<V> {
    inner: LocalCache<ScopedValue<V>>,
}

impl<V> Clone for ScopedCache<V> {
    fn clone(&self) -> Self {
        ScopedCache {
            inner: self.inner.clone(),
        }
    }
}

impl<V> ScopedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a standalone scoped cache with no cross-instance
    /// synchronization.
    pub fn new(
        name: &str,
        store: Arc<dyn Store<ScopedValue<V>>>,
        policy: CachePolicy,
    ) -> Result<Self, CacheError> {
        Ok(ScopedCache {
            inner: LocalCache::new(name, store, policy)?,
        })
    }

    /// Create a scoped cache bound to a notifier for cross-instance
    /// invalidation.
    pub async fn with_notifier(
        name: &str,
        store: Arc<dyn Store<ScopedValue<V>>>,
        policy: CachePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, CacheError> {
        Ok(ScopedCache {
            inner: LocalCache::with_notifier(name, store, policy, notifier).await?,
        })
    }

    /// Name this cache was registered under.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Return the cached value if the ambient scope lets us.
    ///
    /// Reports `GET` with the value on a usable hit, `GET_MISS` with `None`
    /// when the cache was consulted but held nothing recent enough, and no
    /// flags at all when the directives exclude `GET` (the cache was never
    /// consulted).
    pub async fn get(&self, key: &str) -> Result<(MethodTaken, Option<ScopedValue<V>>), CacheError> {
        let directives = current_directives();
        if !directives.allows_get() {
            return Ok((MethodTaken::empty(), None));
        }
        match self.lookup(key, &directives).await? {
            Some(value) => Ok((MethodTaken::GET, Some(value))),
            None => Ok((MethodTaken::GET_MISS, None)),
        }
    }

    /// Get the cached value, or compute one on a miss.
    ///
    /// `compute` returns a [`ScopedValue`] carrying its own timestamp. When
    /// the directives permit `SET` a computed value is stored under the
    /// striped-lock double-checked discipline; when they exclude `SET` the
    /// computation runs without the lock (nothing is stored, so there is no
    /// fill for concurrent callers to collapse onto). When the directives
    /// exclude `GET` no lookup happens at all and the value is always
    /// recomputed.
    ///
    /// Miss-path stores do not publish invalidations; only explicit
    /// mutations do.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<(MethodTaken, ScopedValue<V>), CacheError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<ScopedValue<V>, CacheError>> + Send,
    {
        let directives = current_directives();
        let mut taken = MethodTaken::empty();

        if directives.allows_get() {
            if let Some(value) = self.lookup(key, &directives).await? {
                return Ok((MethodTaken::GET, value));
            }
            taken |= MethodTaken::GET_MISS;
        }

        if !directives.allows_set() {
            let value = compute(key.to_string()).await?;
            return Ok((taken, value));
        }

        let guard = match self.inner.striped_lock() {
            Some(lock) => lock.acquire(key).await?,
            None => None,
        };

        if guard.is_some() && directives.allows_get() {
            // Double-check under the slot; a hit here is still a read.
            if let Some(value) = self.lookup(key, &directives).await? {
                return Ok((MethodTaken::GET, value));
            }
        }

        let value = compute(key.to_string()).await?;
        self.inner.store_value(key, value.clone()).await?;

        drop(guard);
        Ok((taken | MethodTaken::SET, value))
    }

    /// Store a value computed at `timestamp`, if the ambient scope lets us.
    ///
    /// The ambient scope overrides the explicit request: without `SET` in
    /// the directives this is a no-op reporting no flags. Publishes an
    /// `Updated` notification when it does store.
    pub async fn set(&self, key: &str, value: V, timestamp: i64) -> Result<MethodTaken, CacheError> {
        if !current_directives().allows_set() {
            return Ok(MethodTaken::empty());
        }
        self.inner.set(key, ScopedValue::new(value, timestamp)).await?;
        Ok(MethodTaken::SET)
    }

    /// Remove the key from the cache. Not directive-gated.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }

    /// Discard every entry in the cache. Not directive-gated.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }

    /// Lookup honoring the scope's staleness floor. Entries older than the
    /// floor read as misses without being evicted.
    async fn lookup(
        &self,
        key: &str,
        directives: &CacheDirectives,
    ) -> Result<Option<ScopedValue<V>>, CacheError> {
        Ok(self
            .inner
            .get(key)
            .await?
            .filter(|value| value.satisfies(directives.minimum_timestamp)))
    }
}
