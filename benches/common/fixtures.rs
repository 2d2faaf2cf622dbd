use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use herd_cache::CacheError;

/// The value type the benches cache.
#[derive(Clone, Debug)]
pub struct BenchUser {
    pub id: u64,
    pub name: String,
    pub tier: u8,
    pub visits: u64,
}

impl BenchUser {
    pub fn new(id: u64) -> Self {
        BenchUser {
            id,
            name: format!("bench-user-{}", id),
            tier: (id % 4) as u8,
            visits: id * 7 % 101,
        }
    }
}

/// Stand-in for the system of record: a fixed row set behind a simulated
/// network round trip.
#[derive(Clone)]
pub struct FakeDatabase {
    rows: Arc<HashMap<String, BenchUser>>,
    latency: Duration,
}

impl FakeDatabase {
    pub fn new(rows: usize, latency_ms: u64) -> Self {
        let rows = (0..rows as u64)
            .map(|id| (format!("user:{}", id), BenchUser::new(id)))
            .collect();
        FakeDatabase {
            rows: Arc::new(rows),
            latency: Duration::from_millis(latency_ms),
        }
    }

    /// Look up a row, paying the simulated latency.
    pub async fn fetch(&self, key: &str) -> Result<BenchUser, CacheError> {
        tokio::time::sleep(self.latency).await;

        self.rows
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::compute(key, "row missing from fixture database"))
    }
}

/// Key streams for the different workload shapes.
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        KeyGenerator { num_keys }
    }

    /// Every key once, in order. Pairs with pre-populated caches.
    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| format!("user:{}", i)).collect()
    }

    /// `count` draws where roughly `hit_ratio` of them land in the hot
    /// subset of the key space and the rest outside it.
    pub fn mixed(&self, hit_ratio: f64, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let hot = ((self.num_keys as f64 * hit_ratio) as usize).max(1);

        std::iter::repeat_with(|| {
            let id = if rng.gen_bool(hit_ratio) {
                rng.gen_range(0..hot)
            } else {
                rng.gen_range(hot..self.num_keys)
            };
            format!("user:{}", id)
        })
        .take(count)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_database_serves_known_rows() {
        let db = FakeDatabase::new(100, 0);

        let user = db.fetch("user:7").await.unwrap();
        assert_eq!(user.id, 7);

        assert!(db.fetch("user:100").await.is_err());
    }

    #[test]
    fn test_key_patterns() {
        let keys = KeyGenerator::new(100);

        let seq = keys.sequential();
        assert_eq!(seq.len(), 100);
        assert_eq!(seq.first().map(String::as_str), Some("user:0"));

        assert_eq!(keys.mixed(0.8, 50).len(), 50);
    }
}
