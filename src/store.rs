use async_trait::async_trait;

use crate::entry::CacheEntry;
use crate::error::CacheError;

/// A store is a common interface for storing, reading and deleting cache
/// entries.
///
/// Each store instance backs exactly one cache, so keys arrive unscoped; a
/// store that shares a backend between caches adds its own scoping (the
/// Redis store's key prefix, for instance). Stores judge expiration on read
/// using the entry's stamps and clean up expired data on their own.
#[async_trait]
pub trait Store<V>: Send + Sync {
    /// A name for tracing.
    ///
    /// # Example
    /// - "memory"
    /// - "moka"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the live entry for `key`.
    ///
    /// The response must be `None` both for absent keys and for entries past
    /// their deadline. A successful read renews a sliding entry's deadline.
    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError>;

    /// Store the entry, replacing any previous one for the key.
    async fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError>;

    /// Remove the key from the store. Removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every entry this store holds.
    async fn remove_all(&self) -> Result<(), CacheError>;
}
