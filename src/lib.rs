//! herd-cache - stampede-protected caching with scoped reads and
//! cross-instance invalidation
//!
//! This library provides a concurrent caching toolkit with:
//! - Striped-lock miss handling: concurrent misses on one key collapse into
//!   a single computation via a double-checked slot acquisition
//! - Per-write expiration stamping: sliding window, time-to-live from the
//!   write, or an absolute deadline
//! - Scoped reads/writes gated by ambient directives and per-value
//!   staleness floors
//! - Cross-instance invalidation over pluggable notifier transports, with a
//!   stricter fallback expiration while the transport is down
//!
//! # Example
//!
//! ```ignore
//! use herd_cache::{
//!     CacheBuilder, CachePolicy, ExpirationPolicy, MemoryStore, MemoryStoreConfig, Store,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: Arc<dyn Store<String>> =
//!         Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
//!
//!     let users = CacheBuilder::new("users")
//!         .store(store)
//!         .policy(CachePolicy::new(ExpirationPolicy::from_add(
//!             Duration::from_secs(300),
//!         )))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Misses collapse: of N concurrent callers, one computes and the
//!     // rest get the cached result. The callback receives the actual key.
//!     let user = users
//!         .get_or_compute("user:123", |id| async move {
//!             Ok(format!("User data for {}", id))
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

mod builder;
mod cache;
mod directives;
mod entry;
mod error;
mod notifier;
pub mod notifiers;
mod policy;
pub mod registry;
mod scoped;
mod store;
pub mod stores;
mod striped;
mod sync;
mod utils;

// Re-export public API
pub use builder::CacheBuilder;
pub use cache::LocalCache;
pub use directives::{
    CacheDirectives, CacheMethod, MethodTaken, current_directives, with_directives,
};
pub use entry::{CacheEntry, ScopedValue};
pub use error::CacheError;
pub use notifier::{
    CacheItemNotification, ItemHandler, Notifier, NotifyAction, ProviderState, StateHandler,
};
pub use notifiers::{InProcessNotifier, RedisNotifier, RedisNotifierConfig};
pub use policy::{CachePolicy, ExpirationPolicy, LockPolicy, MAX_SLOTS, MIN_SLOTS};
pub use scoped::ScopedCache;
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, MemoryStore, MemoryStoreConfig};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use striped::{SlotGuard, StripedLock};
pub use sync::CacheSynchronizer;
