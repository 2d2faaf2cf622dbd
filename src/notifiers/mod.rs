//! Notifier implementations for the cache library.

pub mod memory;
pub mod redis;

pub use memory::InProcessNotifier;
pub use redis::{RedisNotifier, RedisNotifierConfig};
