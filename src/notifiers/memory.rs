use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::CacheError;
use crate::notifier::{CacheItemNotification, ItemHandler, Notifier, ProviderState, StateHandler};

/// Capacity of the broadcast ring behind the notifier. A subscriber that
/// falls further behind than this skips ahead and logs the gap.
const CHANNEL_CAPACITY: usize = 1000;

struct Subscription {
    listener: JoinHandle<()>,
    on_state: Option<StateHandler>,
}

/// In-process notifier over a broadcast channel.
///
/// Every cache subscribed to the same `InProcessNotifier` instance is a
/// peer: what one publishes, the others receive. Several subscriptions may
/// share one cache name, which is how a distributed deployment is modelled
/// inside a single process. The transport itself never drops, but
/// [`set_state`](InProcessNotifier::set_state) can simulate provider
/// outages, which is how the fallback-expiration path is exercised without
/// external infrastructure.
pub struct InProcessNotifier {
    tx: broadcast::Sender<CacheItemNotification>,
    subs: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl InProcessNotifier {
    /// Create a notifier with its own private channel.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        InProcessNotifier {
            tx,
            subs: RwLock::new(HashMap::new()),
        }
    }

    /// Announce a connectivity transition to every subscription's state
    /// handler. Handlers run to completion before this returns.
    pub async fn set_state(&self, state: ProviderState) {
        let handlers: Vec<StateHandler> = {
            let subs = self.subs.read();
            subs.values()
                .flatten()
                .filter_map(|s| s.on_state.clone())
                .collect()
        };
        for handler in handlers {
            handler(state).await;
        }
    }
}

impl Default for InProcessNotifier {
    fn default() -> Self {
        InProcessNotifier::new()
    }
}

#[async_trait]
impl Notifier for InProcessNotifier {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn subscribe(
        &self,
        cache_name: &str,
        on_item: ItemHandler,
        on_state: Option<StateHandler>,
    ) -> Result<(), CacheError> {
        let mut rx = self.tx.subscribe();
        let name = cache_name.to_string();

        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        if notification.cache_name == name {
                            on_item(notification).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            cache = %name,
                            skipped,
                            "in-process notifier subscription lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.subs
            .write()
            .entry(cache_name.to_string())
            .or_default()
            .push(Subscription { listener, on_state });
        Ok(())
    }

    async fn unsubscribe(&self, cache_name: &str) -> Result<(), CacheError> {
        if let Some(subs) = self.subs.write().remove(cache_name) {
            for sub in subs {
                sub.listener.abort();
            }
        }
        Ok(())
    }

    async fn publish(&self, notification: CacheItemNotification) -> Result<(), CacheError> {
        // A send only errors when no receiver exists, which is not a
        // transport failure.
        let _ = self.tx.send(notification);
        Ok(())
    }

    fn try_publish(&self, notification: CacheItemNotification) -> bool {
        let _ = self.tx.send(notification);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn recording_handler() -> (ItemHandler, Arc<Mutex<Vec<CacheItemNotification>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: ItemHandler = Arc::new(move |notification| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().push(notification);
            })
        });
        (handler, seen)
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let notifier = InProcessNotifier::new();
        let (handler, seen) = recording_handler();
        notifier.subscribe("users", handler, None).await.unwrap();

        let n = CacheItemNotification::removed(Uuid::new_v4(), "users", "user:1");
        notifier.publish(n.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().as_slice(), &[n]);
    }

    #[tokio::test]
    async fn test_other_cache_names_filtered() {
        let notifier = InProcessNotifier::new();
        let (handler, seen) = recording_handler();
        notifier.subscribe("users", handler, None).await.unwrap();

        notifier
            .publish(CacheItemNotification::remove_all(Uuid::new_v4(), "orders"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_stops_delivery() {
        let notifier = InProcessNotifier::new();
        let (handler, seen) = recording_handler();
        notifier.subscribe("users", handler, None).await.unwrap();

        notifier.unsubscribe("users").await.unwrap();
        notifier.unsubscribe("users").await.unwrap();
        notifier.unsubscribe("never-subscribed").await.unwrap();

        notifier
            .publish(CacheItemNotification::remove_all(Uuid::new_v4(), "users"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_set_state_drives_state_handler() {
        let notifier = InProcessNotifier::new();
        let (handler, _) = recording_handler();

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let on_state: StateHandler = Arc::new(move |state| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().push(state);
            })
        });

        notifier
            .subscribe("users", handler, Some(on_state))
            .await
            .unwrap();

        notifier.set_state(ProviderState::Disconnected).await;
        notifier.set_state(ProviderState::Connected).await;

        assert_eq!(
            states.lock().as_slice(),
            &[ProviderState::Disconnected, ProviderState::Connected]
        );
    }

    #[tokio::test]
    async fn test_same_name_subscribers_all_receive() {
        let notifier = InProcessNotifier::new();
        let (first, first_seen) = recording_handler();
        let (second, second_seen) = recording_handler();

        notifier.subscribe("users", first, None).await.unwrap();
        notifier.subscribe("users", second, None).await.unwrap();

        notifier
            .publish(CacheItemNotification::remove_all(Uuid::new_v4(), "users"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first_seen.lock().len(), 1);
        assert_eq!(second_seen.lock().len(), 1);

        // Unsubscribing the name detaches every peer at once.
        notifier.unsubscribe("users").await.unwrap();
        notifier
            .publish(CacheItemNotification::remove_all(Uuid::new_v4(), "users"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first_seen.lock().len(), 1);
        assert_eq!(second_seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_preserves_publish_order() {
        let notifier = InProcessNotifier::new();
        let (handler, seen) = recording_handler();
        notifier.subscribe("users", handler, None).await.unwrap();

        let sender = Uuid::new_v4();
        for i in 0..10 {
            notifier
                .publish(CacheItemNotification::removed(
                    sender,
                    "users",
                    format!("k{}", i),
                ))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let keys: Vec<String> = seen
            .lock()
            .iter()
            .map(|n| n.key.clone().unwrap())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("k{}", i)).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_try_publish_reaches_subscriber() {
        let notifier = InProcessNotifier::new();
        let (handler, seen) = recording_handler();
        notifier.subscribe("users", handler, None).await.unwrap();

        let n = CacheItemNotification::removed(Uuid::new_v4(), "users", "user:1");
        assert!(notifier.try_publish(n.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().as_slice(), &[n]);
    }

    #[tokio::test]
    async fn test_try_publish_without_subscribers_succeeds() {
        let notifier = InProcessNotifier::new();

        // No receivers is a no-op for the transport, not a failure.
        assert!(notifier.try_publish(CacheItemNotification::remove_all(
            Uuid::new_v4(),
            "users"
        )));
    }
}
