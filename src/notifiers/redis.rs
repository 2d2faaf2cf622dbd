use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;

use crate::error::CacheError;
use crate::notifier::{CacheItemNotification, ItemHandler, Notifier, ProviderState, StateHandler};

/// Configuration for RedisNotifier.
#[derive(Debug, Clone)]
pub struct RedisNotifierConfig {
    /// Redis connection URL.
    pub url: String,

    /// Channel prefix; the cache `users` travels on `{prefix}:users`.
    /// Notifiers must share a prefix to see each other.
    pub channel_prefix: String,

    /// Delay between reconnect attempts after the pub/sub stream drops.
    pub reconnect_backoff: Duration,
}

impl RedisNotifierConfig {
    /// A config with the given URL and default prefix/backoff.
    pub fn new(url: impl Into<String>) -> Self {
        RedisNotifierConfig {
            url: url.into(),
            channel_prefix: "herd-cache".to_string(),
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Redis pub/sub notifier.
///
/// Publishes JSON-encoded notifications on one channel per cache name and
/// runs one listener task per subscription. A dropped pub/sub stream turns
/// into a `Disconnected` state callback, a backoff-paced reconnect loop,
/// and a `Connected` callback once the channel is re-established.
///
/// Redis delivers published messages to every subscriber of the channel,
/// including the publisher's own subscription; filtering self-notifications
/// is the subscriber's job.
pub struct RedisNotifier {
    client: redis::Client,
    publish_conn: MultiplexedConnection,
    channel_prefix: String,
    reconnect_backoff: Duration,
    listeners: RwLock<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl RedisNotifier {
    /// Create a new RedisNotifier with the given configuration.
    pub async fn new(config: RedisNotifierConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CacheError::notifier("redis", format!("Failed to create Redis client: {}", e))
        })?;

        let publish_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                CacheError::notifier("redis", format!("Failed to connect to Redis: {}", e))
            })?;

        Ok(RedisNotifier {
            client,
            publish_conn,
            channel_prefix: config.channel_prefix,
            reconnect_backoff: config.reconnect_backoff,
            listeners: RwLock::new(HashMap::new()),
        })
    }

    fn channel(&self, cache_name: &str) -> String {
        format!("{}:{}", self.channel_prefix, cache_name)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn subscribe(
        &self,
        cache_name: &str,
        on_item: ItemHandler,
        on_state: Option<StateHandler>,
    ) -> Result<(), CacheError> {
        let channel = self.channel(cache_name);
        let client = self.client.clone();
        let backoff = self.reconnect_backoff;

        let listener = tokio::spawn(async move {
            let mut connected = false;
            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => match pubsub.subscribe(&channel).await {
                        Ok(()) => {
                            connected = true;
                            if let Some(on_state) = &on_state {
                                on_state(ProviderState::Connected).await;
                            }
                            let mut stream = pubsub.into_on_message();
                            while let Some(msg) = stream.next().await {
                                let payload: String = match msg.get_payload() {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::warn!(
                                            channel = %channel,
                                            "unreadable notification payload: {}",
                                            e
                                        );
                                        continue;
                                    }
                                };
                                match serde_json::from_str::<CacheItemNotification>(&payload) {
                                    Ok(notification) => on_item(notification).await,
                                    Err(e) => {
                                        tracing::warn!(
                                            channel = %channel,
                                            "dropping malformed notification: {}",
                                            e
                                        );
                                    }
                                }
                            }
                            // Stream end means the connection died.
                        }
                        Err(e) => {
                            tracing::warn!(channel = %channel, "pubsub SUBSCRIBE failed: {}", e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!(channel = %channel, "pubsub connection failed: {}", e);
                    }
                }

                if connected {
                    connected = false;
                    if let Some(on_state) = &on_state {
                        on_state(ProviderState::Disconnected).await;
                    }
                }
                tokio::time::sleep(backoff).await;
            }
        });

        self.listeners
            .write()
            .entry(cache_name.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    async fn unsubscribe(&self, cache_name: &str) -> Result<(), CacheError> {
        // Aborting a listener drops its pub/sub connection, which
        // unsubscribes server-side.
        if let Some(listeners) = self.listeners.write().remove(cache_name) {
            for listener in listeners {
                listener.abort();
            }
        }
        Ok(())
    }

    async fn publish(&self, notification: CacheItemNotification) -> Result<(), CacheError> {
        let channel = self.channel(&notification.cache_name);
        let payload = serde_json::to_string(&notification)
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))?;

        let mut conn = self.publish_conn.clone();
        let _: i64 = conn.publish(&channel, payload).await.map_err(|e| {
            CacheError::notifier("redis", format!("PUBLISH on '{}' failed: {}", channel, e))
        })?;
        Ok(())
    }

    fn try_publish(&self, notification: CacheItemNotification) -> bool {
        let channel = self.channel(&notification.cache_name);
        let payload = match serde_json::to_string(&notification) {
            Ok(payload) => payload,
            Err(_) => return false,
        };

        let mut conn = self.publish_conn.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.publish::<_, _, i64>(&channel, payload).await {
                tracing::warn!(channel = %channel, "background PUBLISH failed: {}", e);
            }
        });
        true
    }
}

impl Drop for RedisNotifier {
    fn drop(&mut self) {
        for (_, listeners) in self.listeners.write().drain() {
            for listener in listeners {
                listener.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    // Note: These tests require a running Redis instance.
    // Run with: cargo test -- --ignored

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_publish_crosses_processes() {
        let mut config = RedisNotifierConfig::new("redis://localhost:6379");
        config.channel_prefix = format!("herd_test_{}", Uuid::new_v4().simple());

        let publisher = RedisNotifier::new(config.clone()).await.unwrap();
        let subscriber = RedisNotifier::new(config).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: crate::notifier::ItemHandler = Arc::new(move |notification| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().push(notification);
            })
        });
        subscriber.subscribe("users", handler, None).await.unwrap();

        // Give the listener time to establish its channel
        tokio::time::sleep(Duration::from_millis(200)).await;

        let n = CacheItemNotification::removed(Uuid::new_v4(), "users", "user:1");
        publisher.publish(n.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(seen.lock().as_slice(), &[n]);
    }

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_try_publish_crosses_processes() {
        let mut config = RedisNotifierConfig::new("redis://localhost:6379");
        config.channel_prefix = format!("herd_test_{}", Uuid::new_v4().simple());

        let publisher = RedisNotifier::new(config.clone()).await.unwrap();
        let subscriber = RedisNotifier::new(config).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: crate::notifier::ItemHandler = Arc::new(move |notification| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().push(notification);
            })
        });
        subscriber.subscribe("users", handler, None).await.unwrap();

        // Give the listener time to establish its channel
        tokio::time::sleep(Duration::from_millis(200)).await;

        let n = CacheItemNotification::removed(Uuid::new_v4(), "users", "user:1");
        assert!(publisher.try_publish(n.clone()));

        // The PUBLISH itself runs in the background; wait out the round trip.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(seen.lock().as_slice(), &[n]);
    }
}
