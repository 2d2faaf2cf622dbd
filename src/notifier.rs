//! Invalidation transport abstraction.
//!
//! A [`Notifier`] carries [`CacheItemNotification`]s between instances of
//! the same named cache. It is a thin pub/sub client: no history, no
//! durability, no broker role. Losing a notification costs freshness, not
//! correctness, and the synchronizer compensates for outages with fallback
//! expiration and a reconnect wipe.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CacheError;

/// What happened to a cached item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    /// The item was written with a new value.
    Updated,
    /// The item was removed.
    Removed,
    /// Every item in the cache was removed.
    RemoveAll,
}

impl fmt::Display for NotifyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyAction::Updated => write!(f, "updated"),
            NotifyAction::Removed => write!(f, "removed"),
            NotifyAction::RemoveAll => write!(f, "remove_all"),
        }
    }
}

/// An invalidation event for one named cache.
///
/// Notifications carry no values; receivers drop their local copy and
/// re-fetch on the next read. A `None` key means the event covers every key
/// in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItemNotification {
    /// Identity of the publishing synchronizer, used to filter out a
    /// publisher's own notifications.
    pub sender: Uuid,
    /// The logical cache the event belongs to.
    pub cache_name: String,
    /// The affected key; `None` covers all keys.
    pub key: Option<String>,
    /// What happened.
    pub action: NotifyAction,
}

impl CacheItemNotification {
    /// An item was written with a new value.
    pub fn updated(sender: Uuid, cache_name: impl Into<String>, key: impl Into<String>) -> Self {
        CacheItemNotification {
            sender,
            cache_name: cache_name.into(),
            key: Some(key.into()),
            action: NotifyAction::Updated,
        }
    }

    /// An item was removed.
    pub fn removed(sender: Uuid, cache_name: impl Into<String>, key: impl Into<String>) -> Self {
        CacheItemNotification {
            sender,
            cache_name: cache_name.into(),
            key: Some(key.into()),
            action: NotifyAction::Removed,
        }
    }

    /// The whole cache was cleared.
    pub fn remove_all(sender: Uuid, cache_name: impl Into<String>) -> Self {
        CacheItemNotification {
            sender,
            cache_name: cache_name.into(),
            key: None,
            action: NotifyAction::RemoveAll,
        }
    }
}

/// Transport connectivity as seen by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// The subscription is live and delivering.
    Connected,
    /// The transport was lost; notifications may be missed until recovery.
    Disconnected,
}

/// Handler invoked for each inbound notification, in delivery order.
pub type ItemHandler = Arc<dyn Fn(CacheItemNotification) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler invoked on transport connectivity transitions.
pub type StateHandler = Arc<dyn Fn(ProviderState) -> BoxFuture<'static, ()> + Send + Sync>;

/// A pub/sub transport for cache invalidations.
///
/// A cache name may carry several subscriptions at once; `unsubscribe`
/// detaches all of them. Implementations deliver notifications to a
/// subscription one at a time so handlers observe publish order.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A name for tracing.
    ///
    /// # Example
    /// - "in-process"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Deliver invalidations for `cache_name` to `on_item`, and transport
    /// connectivity transitions to `on_state` when one is given.
    async fn subscribe(
        &self,
        cache_name: &str,
        on_item: ItemHandler,
        on_state: Option<StateHandler>,
    ) -> Result<(), CacheError>;

    /// Stop delivering invalidations for `cache_name`. Unsubscribing a name
    /// that is not subscribed is a no-op.
    async fn unsubscribe(&self, cache_name: &str) -> Result<(), CacheError>;

    /// Publish a notification, waiting until the transport has accepted it.
    async fn publish(&self, notification: CacheItemNotification) -> Result<(), CacheError>;

    /// Hand a notification to the transport without waiting on it or on
    /// slow subscribers. Returns whether the hand-off happened.
    fn try_publish(&self, notification: CacheItemNotification) -> bool;
}
