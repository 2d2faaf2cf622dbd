use std::env;

/// Knobs for the bench run, read from the environment once at startup.
///
/// `DB_LATENCY_MS` tunes the fixture database's simulated round trip;
/// `BENCH_SAMPLE_SIZE` trades measurement precision for wall-clock time.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub db_latency_ms: u64,
    pub sample_size: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            db_latency_ms: env_or("DB_LATENCY_MS", 10),
            sample_size: env_or("BENCH_SAMPLE_SIZE", 60),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!(
            "bench config: db latency {}ms, sample size {}",
            config.db_latency_ms, config.sample_size
        );
        config
    }
}
