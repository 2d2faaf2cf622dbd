//! Striped locking for miss-path serialization.
//!
//! A [`StripedLock`] owns a fixed pool of slots and deterministically maps
//! every key onto one of them, so concurrent work on the same key serializes
//! while work on (most) different keys proceeds in parallel.

use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use std::collections::hash_map::RandomState;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::CacheError;
use crate::policy::LockPolicy;

/// Sleep granularity for the blocking acquisition path's timeout loop.
const BLOCKING_POLL: Duration = Duration::from_millis(1);

/// A pool of lock slots with deterministic key-to-slot mapping.
///
/// The mapping is stable for the lifetime of the instance but randomized
/// between instances: the key's hash is decomposed into base-N digits, each
/// digit is scrambled through a random per-slot table, and the scrambled
/// digits fold into the slot index. Keys that share a slot contend even
/// though they are unrelated; that is the price of a bounded pool.
///
/// Acquisition is not re-entrant. A caller that already holds a key's slot
/// and acquires the same key (or another key mapping to the same slot)
/// deadlocks on itself.
pub struct StripedLock {
    slots: Vec<Arc<Mutex<()>>>,
    scramble: Vec<u64>,
    hasher: RandomState,
    timeout: Option<Duration>,
    throw_on_timeout: bool,
}

/// Exclusive hold on one lock slot. Released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedMutexGuard<()>,
    slot: usize,
}

impl SlotGuard {
    /// The slot this guard holds.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl StripedLock {
    /// Create a lock pool from the given policy. The slot count must lie
    /// within the supported range; the policy's `enabled` flag is the
    /// caller's concern.
    pub fn new(policy: &LockPolicy) -> Result<Self, CacheError> {
        policy.validate()?;
        let mut rng = rand::thread_rng();
        let scramble = (0..policy.slots).map(|_| rng.gen::<u64>()).collect();
        let slots = (0..policy.slots)
            .map(|_| Arc::new(Mutex::new(())))
            .collect();
        Ok(StripedLock {
            slots,
            scramble,
            hasher: RandomState::new(),
            timeout: policy.timeout,
            throw_on_timeout: policy.throw_on_timeout,
        })
    }

    /// Create a lock pool with the given slot count and default waiting
    /// behavior (no timeout).
    pub fn with_slots(slots: usize) -> Result<Self, CacheError> {
        StripedLock::new(&LockPolicy {
            slots,
            ..Default::default()
        })
    }

    /// Number of slots in the pool.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Map a key to its slot. Stable for this instance's lifetime.
    pub fn slot_index(&self, key: &str) -> usize {
        let n = self.slots.len() as u64;
        if n == 1 {
            return 0;
        }
        let mut h = self.hasher.hash_one(key);
        let mut acc = 0u64;
        while h > 0 {
            acc ^= self.scramble[(h % n) as usize];
            h /= n;
        }
        (acc % n) as usize
    }

    /// Wait for the key's slot, bounded by the configured timeout.
    ///
    /// Returns `Ok(Some(guard))` on acquisition. On timeout, returns
    /// `Err(CacheError::LockTimeout)` when the policy throws, otherwise
    /// `Ok(None)` so the caller can proceed without the lock.
    pub async fn acquire(&self, key: &str) -> Result<Option<SlotGuard>, CacheError> {
        let slot = self.slot_index(key);
        let mutex = Arc::clone(&self.slots[slot]);
        let permit = match self.timeout {
            None => mutex.lock_owned().await,
            Some(limit) => match tokio::time::timeout(limit, mutex.lock_owned()).await {
                Ok(permit) => permit,
                Err(_) => return self.timed_out(key, slot),
            },
        };
        Ok(Some(SlotGuard {
            _permit: permit,
            slot,
        }))
    }

    /// Blocking counterpart of [`acquire`](StripedLock::acquire). Must not
    /// be called from within an async context: with no timeout configured
    /// tokio panics rather than block a runtime thread, and with a timeout
    /// the wait loop would stall the worker thread it runs on.
    pub fn blocking_acquire(&self, key: &str) -> Result<Option<SlotGuard>, CacheError> {
        let slot = self.slot_index(key);
        let mutex = Arc::clone(&self.slots[slot]);
        let permit = match self.timeout {
            None => mutex.blocking_lock_owned(),
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    match Arc::clone(&mutex).try_lock_owned() {
                        Ok(permit) => break permit,
                        Err(_) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return self.timed_out(key, slot);
                            }
                            std::thread::sleep(BLOCKING_POLL.min(deadline - now));
                        }
                    }
                }
            }
        };
        Ok(Some(SlotGuard {
            _permit: permit,
            slot,
        }))
    }

    /// Run `action` while holding the key's slot. The slot is released on
    /// every exit path, including panics inside the action.
    ///
    /// Returns `Ok(None)` when the slot was not acquired (timeout with
    /// throwing disabled); the action does not run in that case.
    pub async fn run_exclusive<T, F, Fut>(
        &self,
        key: &str,
        action: F,
    ) -> Result<Option<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        match self.acquire(key).await? {
            Some(guard) => {
                let result = action().await;
                drop(guard);
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Blocking counterpart of [`run_exclusive`](StripedLock::run_exclusive).
    pub fn blocking_run_exclusive<T, F>(&self, key: &str, action: F) -> Result<Option<T>, CacheError>
    where
        F: FnOnce() -> T,
    {
        match self.blocking_acquire(key)? {
            Some(guard) => {
                let result = action();
                drop(guard);
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    fn timed_out(&self, key: &str, slot: usize) -> Result<Option<SlotGuard>, CacheError> {
        if self.throw_on_timeout {
            Err(CacheError::lock_timeout(key, slot))
        } else {
            Ok(None)
        }
    }
}
