//! Process-wide named lookup for caches and notifier providers.
//!
//! Both maps initialize lazily on first use and are never torn down
//! implicitly; `remove_*` drops a registration but anything already holding
//! a handle keeps it alive. Caches register type-erased so one map serves
//! every value type; retrieval downcasts back and fails loudly on a type
//! mismatch instead of reporting a confusing miss.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::CacheError;
use crate::notifier::Notifier;

static CACHES: Lazy<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static NOTIFIERS: Lazy<RwLock<HashMap<String, Arc<dyn Notifier>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a cache under `name`, replacing any previous registration.
pub fn register_cache<C>(name: &str, cache: C)
where
    C: Send + Sync + 'static,
{
    CACHES.write().insert(name.to_string(), Arc::new(cache));
}

/// Fetch the cache registered under `name`.
///
/// `Ok(None)` when nothing is registered under the name. Registered caches
/// are type-erased, so the caller names the concrete cache type; asking for
/// the wrong one is a configuration error, not a miss.
pub fn cache<C>(name: &str) -> Result<Option<C>, CacheError>
where
    C: Clone + Send + Sync + 'static,
{
    let entry = match CACHES.read().get(name) {
        Some(entry) => Arc::clone(entry),
        None => return Ok(None),
    };
    let typed = entry.downcast::<C>().map_err(|_| {
        CacheError::configuration(format!(
            "cache '{}' is registered with a different value type",
            name
        ))
    })?;
    Ok(Some((*typed).clone()))
}

/// Drop the cache registration for `name`. Returns whether one existed.
pub fn remove_cache(name: &str) -> bool {
    CACHES.write().remove(name).is_some()
}

/// Register a notifier provider under `name`, replacing any previous one.
///
/// `CacheBuilder` resolves `CachePolicy::sync_provider` names against this
/// map.
pub fn register_notifier(name: &str, notifier: Arc<dyn Notifier>) {
    NOTIFIERS.write().insert(name.to_string(), notifier);
}

/// Fetch the notifier provider registered under `name`.
pub fn notifier(name: &str) -> Option<Arc<dyn Notifier>> {
    NOTIFIERS.read().get(name).map(Arc::clone)
}

/// Drop the notifier registration for `name`. Returns whether one existed.
pub fn remove_notifier(name: &str) -> bool {
    NOTIFIERS.write().remove(name).is_some()
}
