//! Cache configuration: expiration modes, lock tuning, and the combined
//! per-cache policy with its construction-time validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::utils::duration_ms;

/// Minimum number of striped-lock slots.
pub const MIN_SLOTS: usize = 1;
/// Maximum number of striped-lock slots.
pub const MAX_SLOTS: usize = 1000;

/// How entries written to a cache age out.
///
/// Exactly one mode takes effect, chosen by precedence: sliding window,
/// then time-to-live from the write, then absolute deadline, then none.
/// The default policy never expires anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    /// Idle window; each read pushes the entry's deadline out.
    pub sliding: Option<Duration>,
    /// Fixed lifetime measured from the write.
    pub from_add: Option<Duration>,
    /// Wall-clock deadline in unix milliseconds shared by all entries.
    pub absolute_at: Option<i64>,
}

impl ExpirationPolicy {
    /// Entries never expire on their own.
    pub fn never() -> Self {
        ExpirationPolicy::default()
    }

    /// Entries expire after sitting unread for `window`.
    pub fn sliding(window: Duration) -> Self {
        ExpirationPolicy {
            sliding: Some(window),
            ..Default::default()
        }
    }

    /// Entries expire `ttl` after being written.
    pub fn from_add(ttl: Duration) -> Self {
        ExpirationPolicy {
            from_add: Some(ttl),
            ..Default::default()
        }
    }

    /// All entries expire at the given unix-millis deadline.
    pub fn absolute(deadline_ms: i64) -> Self {
        ExpirationPolicy {
            absolute_at: Some(deadline_ms),
            ..Default::default()
        }
    }

    /// Resolve the stamps for an entry written at `now`: its deadline and,
    /// for sliding policies, the window each read renews it by.
    pub fn deadlines(&self, now: i64) -> (Option<i64>, Option<i64>) {
        if let Some(window) = self.sliding {
            let window_ms = duration_ms(window);
            (Some(now + window_ms), Some(window_ms))
        } else if let Some(ttl) = self.from_add {
            (Some(now + duration_ms(ttl)), None)
        } else if let Some(at) = self.absolute_at {
            (Some(at), None)
        } else {
            (None, None)
        }
    }

    /// The longest an entry written at `now` can live without being read,
    /// in milliseconds. `None` means unbounded. The idle window stands in
    /// for a sliding policy's lifetime.
    pub fn horizon_ms(&self, now: i64) -> Option<i64> {
        if let Some(window) = self.sliding {
            Some(duration_ms(window))
        } else if let Some(ttl) = self.from_add {
            Some(duration_ms(ttl))
        } else {
            self.absolute_at.map(|at| (at - now).max(0))
        }
    }
}

/// Tuning for the striped lock guarding a cache's miss path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Whether misses are serialized at all. Disabled means every miss
    /// computes independently.
    pub enabled: bool,
    /// Number of lock slots. Valid range is [`MIN_SLOTS`], [`MAX_SLOTS`].
    pub slots: usize,
    /// Upper bound on waiting for a slot. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// On timeout: `true` surfaces a `LockTimeout` error, `false` lets the
    /// caller proceed without the lock.
    pub throw_on_timeout: bool,
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy {
            enabled: true,
            slots: 64,
            timeout: None,
            throw_on_timeout: true,
        }
    }
}

impl LockPolicy {
    /// Check the slot count against the supported range.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.slots < MIN_SLOTS || self.slots > MAX_SLOTS {
            return Err(CacheError::configuration(format!(
                "lock slots must be within [{}, {}], got {}",
                MIN_SLOTS, MAX_SLOTS, self.slots
            )));
        }
        Ok(())
    }
}

/// Everything a cache instance is configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Expiration stamped onto entries while the sync provider is healthy.
    pub expiration: ExpirationPolicy,
    /// Miss-path lock tuning.
    pub lock: LockPolicy,
    /// Name of a registered notifier provider to synchronize through.
    pub sync_provider: Option<String>,
    /// Stricter expiration stamped onto entries while the sync provider is
    /// unreachable. Requires `sync_provider`.
    pub fallback_expiration: Option<ExpirationPolicy>,
}

impl CachePolicy {
    /// A policy with the given expiration and defaults everywhere else.
    pub fn new(expiration: ExpirationPolicy) -> Self {
        CachePolicy {
            expiration,
            ..Default::default()
        }
    }

    /// Replace the lock tuning.
    pub fn with_lock(mut self, lock: LockPolicy) -> Self {
        self.lock = lock;
        self
    }

    /// Synchronize through the named notifier provider.
    pub fn with_sync_provider(mut self, name: impl Into<String>) -> Self {
        self.sync_provider = Some(name.into());
        self
    }

    /// Use a stricter expiration while the sync provider is unreachable.
    pub fn with_fallback(mut self, fallback: ExpirationPolicy) -> Self {
        self.fallback_expiration = Some(fallback);
        self
    }

    /// Validate the policy as a whole. Run once at cache construction; a
    /// policy that fails here never produces a cache instance.
    ///
    /// `has_provider` is whether a notifier is actually wired up, by name or
    /// handed in directly; a fallback expiration is meaningless without one.
    pub fn validate(&self, now: i64, has_provider: bool) -> Result<(), CacheError> {
        self.lock.validate()?;

        if let Some(fallback) = &self.fallback_expiration {
            if !has_provider {
                return Err(CacheError::configuration(
                    "a fallback expiration requires a sync provider",
                ));
            }
            match (self.expiration.horizon_ms(now), fallback.horizon_ms(now)) {
                (Some(primary), None) => {
                    return Err(CacheError::configuration(format!(
                        "fallback expiration is unbounded but the primary expires after {}ms",
                        primary
                    )));
                }
                (Some(primary), Some(fb)) if fb > primary => {
                    return Err(CacheError::configuration(format!(
                        "fallback expiration ({}ms) outlives the primary ({}ms)",
                        fb, primary
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_sliding_wins() {
        let policy = ExpirationPolicy {
            sliding: Some(Duration::from_millis(500)),
            from_add: Some(Duration::from_secs(10)),
            absolute_at: Some(99_999),
        };
        let (expires_at, sliding_ms) = policy.deadlines(1_000);
        assert_eq!(expires_at, Some(1_500));
        assert_eq!(sliding_ms, Some(500));
    }

    #[test]
    fn test_precedence_from_add_over_absolute() {
        let policy = ExpirationPolicy {
            from_add: Some(Duration::from_secs(2)),
            absolute_at: Some(99_999),
            ..Default::default()
        };
        let (expires_at, sliding_ms) = policy.deadlines(1_000);
        assert_eq!(expires_at, Some(3_000));
        assert_eq!(sliding_ms, None);
    }

    #[test]
    fn test_absolute_deadline_is_shared() {
        let policy = ExpirationPolicy::absolute(50_000);
        assert_eq!(policy.deadlines(1_000), (Some(50_000), None));
        assert_eq!(policy.deadlines(40_000), (Some(50_000), None));
    }

    #[test]
    fn test_never_has_no_deadline() {
        assert_eq!(ExpirationPolicy::never().deadlines(1_000), (None, None));
    }

    #[test]
    fn test_lock_policy_rejects_out_of_range_slots() {
        let mut policy = LockPolicy {
            slots: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        policy.slots = 1001;
        assert!(policy.validate().is_err());
        policy.slots = 1000;
        assert!(policy.validate().is_ok());
        policy.slots = 1;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_fallback_requires_provider() {
        let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(60)))
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(5)));
        let err = policy.validate(0, false).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_fallback_must_not_outlive_primary() {
        let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(5)))
            .with_sync_provider("bus")
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(60)));
        assert!(policy.validate(0, true).is_err());

        let unbounded_fallback = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(5)))
            .with_sync_provider("bus")
            .with_fallback(ExpirationPolicy::never());
        assert!(unbounded_fallback.validate(0, true).is_err());
    }

    #[test]
    fn test_stricter_fallback_accepted() {
        let policy = CachePolicy::new(ExpirationPolicy::from_add(Duration::from_secs(60)))
            .with_sync_provider("bus")
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(5)));
        assert!(policy.validate(0, true).is_ok());

        let unbounded_primary = CachePolicy::new(ExpirationPolicy::never())
            .with_sync_provider("bus")
            .with_fallback(ExpirationPolicy::from_add(Duration::from_secs(5)));
        assert!(unbounded_primary.validate(0, true).is_ok());
    }
}
