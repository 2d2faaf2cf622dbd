//! Ambient control of scoped cache operations.
//!
//! Callers establish [`CacheDirectives`] for a region of work with
//! [`with_directives`]; every scoped-cache call inside that region consults
//! them. The scope is task-local and restores the surrounding directives on
//! every exit path, so a narrowed region can never leak its restrictions.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which cache methods the ambient scope permits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CacheMethod: u8 {
        /// Reads may be served from the cache.
        const GET = 0b01;
        /// Values may be written to the cache.
        const SET = 0b10;
        /// Full read-through behavior.
        const GET_OR_SET = Self::GET.bits() | Self::SET.bits();
    }
}

// bitflags 2.x does not derive serde for generated types; carry the raw bits.
impl Serialize for CacheMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CacheMethod {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid CacheMethod bits: {:#04x}", bits))
        })
    }
}

bitflags! {
    /// What a scoped cache operation actually did, as opposed to what it
    /// was asked to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodTaken: u8 {
        /// A cached value was returned.
        const GET = 0b001;
        /// The cache was consulted and had nothing usable. Set both for
        /// physically absent entries and for entries judged too stale.
        const GET_MISS = 0b010;
        /// A value was written to the cache.
        const SET = 0b100;
    }
}

/// Ambient instructions for scoped cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDirectives {
    /// Permitted cache methods.
    pub method: CacheMethod,
    /// Cached values computed before this unix-millis timestamp are treated
    /// as misses. Zero accepts anything.
    pub minimum_timestamp: i64,
}

impl Default for CacheDirectives {
    fn default() -> Self {
        CacheDirectives {
            method: CacheMethod::GET_OR_SET,
            minimum_timestamp: 0,
        }
    }
}

impl CacheDirectives {
    /// Directives permitting the given methods with no staleness floor.
    pub fn new(method: CacheMethod) -> Self {
        CacheDirectives {
            method,
            minimum_timestamp: 0,
        }
    }

    /// Serve reads from cache but never write to it.
    pub fn read_only() -> Self {
        CacheDirectives::new(CacheMethod::GET)
    }

    /// Write computed values but never serve a cached one.
    pub fn refresh() -> Self {
        CacheDirectives::new(CacheMethod::SET)
    }

    /// Neither read nor write the cache.
    pub fn bypass() -> Self {
        CacheDirectives::new(CacheMethod::empty())
    }

    /// Treat values computed before `timestamp` as misses.
    pub fn with_minimum_timestamp(mut self, timestamp: i64) -> Self {
        self.minimum_timestamp = timestamp;
        self
    }

    /// Whether reads from cache are permitted.
    pub fn allows_get(&self) -> bool {
        self.method.contains(CacheMethod::GET)
    }

    /// Whether writes to cache are permitted.
    pub fn allows_set(&self) -> bool {
        self.method.contains(CacheMethod::SET)
    }
}

tokio::task_local! {
    static DIRECTIVES: CacheDirectives;
}

/// Run `future` with the given directives as the ambient scope.
///
/// Scopes nest; when the future finishes (or is dropped, or panics) the
/// surrounding scope is back in effect.
pub async fn with_directives<F>(directives: CacheDirectives, future: F) -> F::Output
where
    F: std::future::Future,
{
    DIRECTIVES.scope(directives, future).await
}

/// The directives in effect for the current task. Outside any scope this is
/// the permissive default: `GET_OR_SET` with no staleness floor.
pub fn current_directives() -> CacheDirectives {
    DIRECTIVES.try_with(|d| *d).unwrap_or_default()
}
