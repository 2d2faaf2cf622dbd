//! Example demonstrating cross-instance invalidation between two caches
//! sharing a notification channel.
//!
//! Two `LocalCache` instances with the same name stand in for two processes
//! holding their own local copies of the same data. The in-process notifier
//! carries their invalidation traffic so the example runs without external
//! infrastructure; swap in `RedisNotifier` to run the same flow across real
//! processes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use herd_cache::{
    CachePolicy, ExpirationPolicy, InProcessNotifier, LocalCache, MemoryStore, MemoryStoreConfig,
    Notifier, ProviderState, Store,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

fn user_store() -> Arc<dyn Store<User>> {
    Arc::new(MemoryStore::new(MemoryStoreConfig::default()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Surface the synchronizer's outage and recovery logs.
    tracing_subscriber::fmt()
        .with_env_filter("herd_cache=info")
        .init();

    let notifier = Arc::new(InProcessNotifier::new());

    // Entries normally live an hour; during a provider outage new writes
    // only get two seconds, since peers cannot be told about changes.
    let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(3600)))
        .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(2)));

    let cache_a = LocalCache::with_notifier(
        "users",
        user_store(),
        policy.clone(),
        notifier.clone() as Arc<dyn Notifier>,
    )
    .await?;
    let cache_b = LocalCache::with_notifier(
        "users",
        user_store(),
        policy,
        notifier.clone() as Arc<dyn Notifier>,
    )
    .await?;

    // Instance B warms its copy through the read-through path. Miss fills
    // stay local, so nothing is published yet.
    let user = cache_b
        .get_or_compute("user:1", |key| async move {
            println!("[b] loading {} from the database", key);
            Ok(User {
                id: 1,
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
            })
        })
        .await?;
    println!("[b] cached: {:?}", user);

    // Instance A writes a newer version. The write is published, so B drops
    // its stale copy while A keeps the entry it just wrote.
    cache_a
        .set(
            "user:1",
            User {
                id: 1,
                name: "Alice".to_string(),
                email: "alice@corp.example.com".to_string(),
            },
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("[a] after own set:  {:?}", cache_a.get("user:1").await?);
    println!("[b] after A's set:  {:?}", cache_b.get("user:1").await?); // None

    // B's next read-through repopulates from the source of truth.
    let user = cache_b
        .get_or_compute("user:1", |key| async move {
            println!("[b] reloading {} from the database", key);
            Ok(User {
                id: 1,
                name: "Alice".to_string(),
                email: "alice@corp.example.com".to_string(),
            })
        })
        .await?;
    println!("[b] repopulated: {:?}", user);

    // The provider goes down. Caches keep serving, but new writes carry the
    // two-second fallback lifetime instead of an hour.
    println!("\n--- provider outage ---");
    notifier.set_state(ProviderState::Disconnected).await;

    cache_a
        .set(
            "user:2",
            User {
                id: 2,
                name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
            },
        )
        .await?;
    println!("[a] wrote user:2 during the outage");
    println!("[a] user:2 now:     {:?}", cache_a.get("user:2").await?);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    println!("[a] user:2 after 2.5s: {:?}", cache_a.get("user:2").await?); // None

    // On recovery every instance drops its local entries: invalidations may
    // have been missed while the provider was away.
    println!("\n--- provider recovered ---");
    notifier.set_state(ProviderState::Connected).await;

    println!("[a] user:1 after recovery: {:?}", cache_a.get("user:1").await?); // None
    println!("[b] user:1 after recovery: {:?}", cache_b.get("user:1").await?); // None

    Ok(())
}
