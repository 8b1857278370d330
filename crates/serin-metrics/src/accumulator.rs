//! Request accumulator.
//!
//! Atomics for the counters and a mutex-protected sample vector for
//! latencies, so the hot record path never blocks on the poll path for
//! long.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Aggregated view served at `/metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Requests seen since the last reset.
    pub request_count: u64,
    /// Failed requests since the last reset.
    pub error_count: u64,
    /// `error_count / request_count`; zero when nothing was seen.
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub latency_p95_ms: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

#[derive(Default, Clone, Copy)]
struct ResourceUsage {
    cpu: f64,
    memory: f64,
}

struct Inner {
    request_count: AtomicU64,
    error_count: AtomicU64,
    /// Latency samples in milliseconds since the last reset.
    latencies: Mutex<Vec<f64>>,
    /// Gauges set by the host; a reset does not clear them.
    resources: Mutex<ResourceUsage>,
}

/// Shared accumulator for one canary process.
///
/// Clones share the same counters; hand one clone to the request path
/// and one to the exposition router.
#[derive(Clone)]
pub struct MetricsAccumulator {
    inner: Arc<Inner>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                request_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                latencies: Mutex::new(Vec::new()),
                resources: Mutex::new(ResourceUsage::default()),
            }),
        }
    }

    /// Record one finished request.
    pub async fn record(&self, latency_ms: f64, is_error: bool) {
        self.inner.request_count.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.latencies.lock().await.push(latency_ms);
    }

    /// Update the process resource gauges.
    pub async fn set_resource_usage(&self, cpu: f64, memory: f64) {
        let mut resources = self.inner.resources.lock().await;
        resources.cpu = cpu;
        resources.memory = memory;
    }

    /// Aggregate the current window into a report, without resetting.
    pub async fn snapshot(&self) -> MetricsReport {
        let request_count = self.inner.request_count.load(Ordering::Relaxed);
        let error_count = self.inner.error_count.load(Ordering::Relaxed);
        let error_rate = if request_count > 0 {
            error_count as f64 / request_count as f64
        } else {
            0.0
        };

        let latencies = self.inner.latencies.lock().await;
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let mut sorted = latencies.clone();
        drop(latencies);
        sorted.sort_unstable_by(f64::total_cmp);
        let latency_p95_ms = percentile(&sorted, 0.95);

        let resources = *self.inner.resources.lock().await;

        MetricsReport {
            request_count,
            error_count,
            error_rate,
            avg_latency_ms,
            latency_p95_ms,
            cpu_usage: resources.cpu,
            memory_usage: resources.memory,
        }
    }

    /// Start a fresh window: counters and samples go to zero, the
    /// resource gauges keep their last value.
    pub async fn reset(&self) {
        self.inner.request_count.store(0, Ordering::Relaxed);
        self.inner.error_count.store(0, Ordering::Relaxed);
        self.inner.latencies.lock().await.clear();
    }
}

impl Default for MetricsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile over sorted samples; 0 when empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
