//! Builder API for wiring up cache instances.
//!
//! The builder gathers a name, a backing store, a policy and (optionally) a
//! sync notifier, runs every configuration check, and only then hands out a
//! usable cache. A notifier can be passed in directly or named through
//! [`CachePolicy::sync_provider`], in which case it is resolved from the
//! global [`registry`](crate::registry) at build time.

use std::sync::Arc;

use crate::cache::LocalCache;
use crate::entry::ScopedValue;
use crate::error::CacheError;
use crate::notifier::Notifier;
use crate::policy::CachePolicy;
use crate::registry;
use crate::scoped::ScopedCache;
use crate::store::Store;

/// Builder for a single named cache.
///
/// The type parameter is the *stored* type: `CacheBuilder<V>` builds a
/// [`LocalCache<V>`], and `CacheBuilder<ScopedValue<V>>` builds a
/// [`ScopedCache<V>`] via [`build_scoped`](CacheBuilder::build_scoped).
///
/// # Example
/// ```ignore
/// let store: Arc<dyn Store<User>> = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
///
/// let users = CacheBuilder::new("users")
///     .store(store)
///     .policy(CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(300))))
///     .build()
///     .await?;
/// ```
pub struct CacheBuilder<V> {
    name: String,
    store: Option<Arc<dyn Store<V>>>,
    policy: CachePolicy,
    notifier: Option<Arc<dyn Notifier>>,
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start building a cache with the given name and a default policy
    /// (no expiration, striped locking enabled).
    pub fn new(name: &str) -> Self {
        CacheBuilder {
            name: name.to_string(),
            store: None,
            policy: CachePolicy::default(),
            notifier: None,
        }
    }

    /// Set the backing store. Required.
    pub fn store(mut self, store: Arc<dyn Store<V>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the cache policy. Defaults to no expiration with locking enabled.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bind a notifier directly instead of naming a registered provider.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build a [`LocalCache`].
    ///
    /// Fails on any configuration problem: missing store, invalid policy,
    /// or a `sync_provider` name with no matching registration.
    pub async fn build(self) -> Result<LocalCache<V>, CacheError> {
        let (name, store, policy, notifier) = self.into_parts()?;
        match notifier {
            Some(notifier) => LocalCache::with_notifier(&name, store, policy, notifier).await,
            None => LocalCache::new(&name, store, policy),
        }
    }

    /// Resolve the notifier and check the pieces that do not depend on the
    /// cache flavor being built.
    fn into_parts(
        self,
    ) -> Result<
        (
            String,
            Arc<dyn Store<V>>,
            CachePolicy,
            Option<Arc<dyn Notifier>>,
        ),
        CacheError,
    > {
        let store = self.store.ok_or_else(|| {
            CacheError::configuration(format!("cache '{}' has no backing store", self.name))
        })?;

        let notifier = match (self.notifier, &self.policy.sync_provider) {
            (Some(_), Some(provider)) => {
                return Err(CacheError::configuration(format!(
                    "cache '{}' both names sync provider '{}' and binds a notifier directly",
                    self.name, provider
                )));
            }
            (Some(handle), None) => Some(handle),
            (None, Some(provider)) => Some(registry::notifier(provider).ok_or_else(|| {
                CacheError::configuration(format!("sync provider '{}' is not registered", provider))
            })?),
            (None, None) => None,
        };

        Ok((self.name, store, self.policy, notifier))
    }
}

impl<V> CacheBuilder<ScopedValue<V>>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build a [`ScopedCache`].
    ///
    /// Available when the builder's store holds [`ScopedValue`]s, which is
    /// what the scoped engine reads and writes.
    pub async fn build_scoped(self) -> Result<ScopedCache<V>, CacheError> {
        let (name, store, policy, notifier) = self.into_parts()?;
        match notifier {
            Some(notifier) => ScopedCache::with_notifier(&name, store, policy, notifier).await,
            None => ScopedCache::new(&name, store, policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifiers::InProcessNotifier;
    use crate::policy::{ExpirationPolicy, LockPolicy};
    use crate::stores::{MemoryStore, MemoryStoreConfig};
    use std::time::Duration;

    fn memory_store<V: Clone + Send + Sync + 'static>() -> Arc<dyn Store<V>> {
        Arc::new(MemoryStore::new(MemoryStoreConfig::default()))
    }

    #[tokio::test]
    async fn test_build_requires_store() {
        let result = CacheBuilder::<String>::new("users").build().await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_basic_cache() {
        let cache = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .build()
            .await
            .unwrap();

        cache.set("k", "v".to_string()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected() {
        let policy = CachePolicy::new(ExpirationPolicy::never()).with_lock(LockPolicy {
            slots: 0,
            ..LockPolicy::default()
        });
        let result = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .policy(policy)
            .build()
            .await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unknown_provider_name_fails() {
        let policy =
            CachePolicy::new(ExpirationPolicy::never()).with_sync_provider("no-such-provider");
        let result = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .policy(policy)
            .build()
            .await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_registered_provider_resolves() {
        let provider = "builder-test-provider";
        registry::register_notifier(provider, Arc::new(InProcessNotifier::new()));

        let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(600)))
            .with_sync_provider(provider)
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(30)));
        let result = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .policy(policy)
            .build()
            .await;
        assert!(result.is_ok());

        registry::remove_notifier(provider);
    }

    #[tokio::test]
    async fn test_fallback_without_any_provider_fails() {
        let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(600)))
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(30)));
        let result = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .policy(policy)
            .build()
            .await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_explicit_notifier_and_named_provider_conflict() {
        let policy = CachePolicy::new(ExpirationPolicy::never()).with_sync_provider("somewhere");
        let result = CacheBuilder::new("users")
            .store(memory_store::<String>())
            .policy(policy)
            .notifier(Arc::new(InProcessNotifier::new()))
            .build()
            .await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_scoped() {
        let cache = CacheBuilder::new("profiles")
            .store(memory_store::<ScopedValue<String>>())
            .notifier(Arc::new(InProcessNotifier::new()))
            .build_scoped()
            .await
            .unwrap();

        let taken = cache.set("p", "v".to_string(), 1_000).await.unwrap();
        assert!(!taken.is_empty());
        let (_, value) = cache.get("p").await.unwrap();
        assert_eq!(value.unwrap().value, "v");
    }
}
