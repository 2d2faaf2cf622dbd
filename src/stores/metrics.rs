//! Instrumentation layer over a backing store.
//!
//! [`MetricsStore`] wraps any other [`Store`] and reports one
//! [`CacheMetric`] per operation to a caller-supplied [`MetricsSink`],
//! leaving results and errors untouched.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::Store;

/// One store operation, as seen by the sink.
///
/// Every variant carries the wrapped store's name, so one sink can serve
/// several instrumented stores. Latencies cover the inner operation only,
/// not the sink's own work.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// A `try_get`. `hit` is true when a live entry came back.
    Read {
        key: String,
        hit: bool,
        latency_ms: f64,
        store: String,
    },
    /// A `set`.
    Write {
        key: String,
        latency_ms: f64,
        store: String,
    },
    /// A single-key `remove`.
    Remove {
        key: String,
        latency_ms: f64,
        store: String,
    },
    /// A `remove_all`.
    RemoveAll { latency_ms: f64, store: String },
}

/// Receiver for store metrics.
///
/// `emit` runs inline on the store's hot path and must not block; buffer
/// and hand off instead of doing I/O there. `flush` is where buffered
/// metrics drain, typically at shutdown.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    fn emit(&self, metric: CacheMetric);

    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Store wrapper reporting per-operation latency and hit/miss outcomes.
///
/// Transparent to the engine: the wrapped store's entries, errors and
/// expiration behavior pass through unchanged, and failed operations are
/// still measured.
///
/// ```ignore
/// let inner: Arc<dyn Store<User>> = Arc::new(MemoryStore::default());
/// let instrumented = MetricsStore::new(inner, sink);
/// ```
pub struct MetricsStore<V> {
    inner: Arc<dyn Store<V>>,
    sink: Arc<dyn MetricsSink>,
    store_name: String,
}

impl<V> MetricsStore<V> {
    /// Wrap `inner`, reporting every operation to `sink`.
    pub fn new(inner: Arc<dyn Store<V>>, sink: Arc<dyn MetricsSink>) -> Self {
        let store_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            store_name,
        }
    }

    /// The sink this store reports to, for flushing at shutdown.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn ms_since(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl<V> Store<V> for MetricsStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError> {
        let start = Instant::now();
        let result = self.inner.try_get(key).await;

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            hit: matches!(&result, Ok(Some(_))),
            latency_ms: Self::ms_since(start),
            store: self.store_name.clone(),
        });

        result
    }

    async fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, entry).await;

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            latency_ms: Self::ms_since(start),
            store: self.store_name.clone(),
        });

        result
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.remove(key).await;

        self.sink.emit(CacheMetric::Remove {
            key: key.to_string(),
            latency_ms: Self::ms_since(start),
            store: self.store_name.clone(),
        });

        result
    }

    async fn remove_all(&self) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.remove_all().await;

        self.sink.emit(CacheMetric::RemoveAll {
            latency_ms: Self::ms_since(start),
            store: self.store_name.clone(),
        });

        result
    }
}
