//! Bridges one cache instance onto an invalidation transport.
//!
//! A [`CacheSynchronizer`] owns the cache's subscription for its lifetime:
//! inbound notifications from peers clear the affected local entries, and
//! the engines call the publish helpers after every externally visible
//! mutation. Publish failures are logged and never fail the mutation; the
//! local write already happened and peers self-heal through expiration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::CacheError;
use crate::notifier::{
    CacheItemNotification, ItemHandler, Notifier, NotifyAction, ProviderState, StateHandler,
};
use crate::store::Store;

/// One cache instance's connection to a notifier.
///
/// Every synchronizer has a unique sender id; notifications carrying that id
/// are its own reflections and are dropped on receipt, so a local `set`
/// never clears the entry it just wrote.
pub struct CacheSynchronizer {
    sender: Uuid,
    cache_name: String,
    notifier: Arc<dyn Notifier>,
    fallback_active: Arc<AtomicBool>,
}

impl CacheSynchronizer {
    /// Subscribe `store` to invalidations for `cache_name` on `notifier`.
    ///
    /// When `has_fallback` is set, provider loss additionally flips the
    /// fallback flag the engines stamp entries by. Recovery after a loss
    /// clears the whole local store: invalidations may have been missed, so
    /// everything held locally is suspect.
    pub async fn bind<V>(
        cache_name: &str,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn Store<V>>,
        has_fallback: bool,
    ) -> Result<Arc<Self>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let sender = Uuid::new_v4();
        let fallback_active = Arc::new(AtomicBool::new(false));

        let on_item = Self::item_handler(sender, cache_name, Arc::clone(&store));
        let on_state = Self::state_handler(
            cache_name,
            store,
            Arc::clone(&fallback_active),
            has_fallback,
        );

        notifier
            .subscribe(cache_name, on_item, Some(on_state))
            .await?;

        Ok(Arc::new(CacheSynchronizer {
            sender,
            cache_name: cache_name.to_string(),
            notifier,
            fallback_active,
        }))
    }

    fn item_handler<V>(sender: Uuid, cache_name: &str, store: Arc<dyn Store<V>>) -> ItemHandler
    where
        V: Clone + Send + Sync + 'static,
    {
        let name = cache_name.to_string();
        Arc::new(move |notification: CacheItemNotification| {
            let store = Arc::clone(&store);
            let name = name.clone();
            Box::pin(async move {
                if notification.sender == sender {
                    return;
                }
                match (notification.action, &notification.key) {
                    (NotifyAction::RemoveAll, _) | (_, None) => {
                        tracing::debug!(cache = %name, "applying remote remove_all");
                        if let Err(e) = store.remove_all().await {
                            tracing::warn!(
                                cache = %name,
                                "failed to apply remote remove_all: {}",
                                e
                            );
                        }
                    }
                    (action, Some(key)) => {
                        tracing::debug!(
                            cache = %name,
                            key = %key,
                            action = %action,
                            "applying remote invalidation"
                        );
                        if let Err(e) = store.remove(key).await {
                            tracing::warn!(
                                cache = %name,
                                key = %key,
                                "failed to apply remote invalidation: {}",
                                e
                            );
                        }
                    }
                }
            })
        })
    }

    fn state_handler<V>(
        cache_name: &str,
        store: Arc<dyn Store<V>>,
        fallback_active: Arc<AtomicBool>,
        has_fallback: bool,
    ) -> StateHandler
    where
        V: Clone + Send + Sync + 'static,
    {
        let name = cache_name.to_string();
        let saw_outage = Arc::new(AtomicBool::new(false));
        Arc::new(move |state: ProviderState| {
            let store = Arc::clone(&store);
            let fallback_active = Arc::clone(&fallback_active);
            let saw_outage = Arc::clone(&saw_outage);
            let name = name.clone();
            Box::pin(async move {
                match state {
                    ProviderState::Disconnected => {
                        saw_outage.store(true, Ordering::SeqCst);
                        if has_fallback && !fallback_active.swap(true, Ordering::SeqCst) {
                            tracing::warn!(
                                cache = %name,
                                "sync provider unavailable, fallback expiration active"
                            );
                        }
                    }
                    ProviderState::Connected => {
                        // Only a recovery wipes; the initial subscription
                        // also announces Connected.
                        if saw_outage.swap(false, Ordering::SeqCst) {
                            tracing::info!(
                                cache = %name,
                                "sync provider recovered, clearing local entries"
                            );
                            if let Err(e) = store.remove_all().await {
                                tracing::warn!(
                                    cache = %name,
                                    "failed to clear after reconnect: {}",
                                    e
                                );
                            }
                            fallback_active.store(false, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
    }

    /// The sender id stamped onto this synchronizer's notifications.
    pub fn sender(&self) -> Uuid {
        self.sender
    }

    /// The cache name this synchronizer serves.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Whether entries should currently be stamped with the fallback
    /// expiration.
    pub fn fallback_active(&self) -> bool {
        self.fallback_active.load(Ordering::SeqCst)
    }

    /// Tell peers a key was written.
    pub async fn publish_updated(&self, key: &str) {
        self.publish(CacheItemNotification::updated(
            self.sender,
            &self.cache_name,
            key,
        ))
        .await;
    }

    /// Tell peers a key was removed.
    pub async fn publish_removed(&self, key: &str) {
        self.publish(CacheItemNotification::removed(
            self.sender,
            &self.cache_name,
            key,
        ))
        .await;
    }

    /// Tell peers the whole cache was cleared.
    pub async fn publish_remove_all(&self) {
        self.publish(CacheItemNotification::remove_all(
            self.sender,
            &self.cache_name,
        ))
        .await;
    }

    async fn publish(&self, notification: CacheItemNotification) {
        if let Err(e) = self.notifier.publish(notification).await {
            tracing::warn!(
                cache = %self.cache_name,
                provider = self.notifier.name(),
                "failed to publish invalidation: {}",
                e
            );
        }
    }
}

impl Drop for CacheSynchronizer {
    fn drop(&mut self) {
        // Best-effort unsubscribe; outside a runtime the notifier's own
        // teardown covers it.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let notifier = Arc::clone(&self.notifier);
            let name = self.cache_name.clone();
            handle.spawn(async move {
                let _ = notifier.unsubscribe(&name).await;
            });
        }
    }
}
