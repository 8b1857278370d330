//! The synthetic cluster and its control-loop handle.
//!
//! One `SyntheticCluster` models one rollout session: it owns the seeded
//! generator, the drawn scenario, the canary traffic split set through
//! the sink side, and the cascade state that carries cluster-wide
//! degradation across steps. `SimHandle` wraps a cluster in a shared
//! handle implementing both `MetricsSource` and `TrafficSink`, so the
//! identical control loop runs against it unmodified.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use serin_core::contract::{MetricsSource, SinkError, SourceError, TrafficSink};
use serin_core::types::MetricSnapshot;

use crate::scenario::{DEFAULT_WEIGHTS, Scenario};

/// Synthetic cluster configuration.
///
/// `Default` carries the documented model constants; tests set
/// `noise_scale` to 0 for exact expected values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Services in the simulated dependency graph. The canary's errors
    /// propagate to the other `service_count - 1`.
    pub service_count: u32,
    /// Seed for the generator; same seed + same config = same rollout.
    pub seed: u64,
    /// Forced scenario; `None` draws one by weight at construction.
    pub scenario: Option<Scenario>,
    /// Draw weights in `Scenario::ALL` order.
    pub scenario_weights: [f64; 4],
    /// Multiplier on every Gaussian noise sigma. 0 disables noise.
    pub noise_scale: f64,
    /// Step horizon the degrading profile ramps over.
    pub horizon: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            service_count: 5,
            seed: 42,
            scenario: None,
            scenario_weights: DEFAULT_WEIGHTS,
            noise_scale: 1.0,
            horizon: 100,
        }
    }
}

/// Deterministic model of the cluster under a canary rollout.
///
/// Each `sample()` produces one step's `MetricSnapshot` and advances the
/// cascade state exactly once. The traffic split is pushed in through
/// `set_traffic` (the sink side); the model never decides anything.
#[derive(Debug)]
pub struct SyntheticCluster {
    config: SimConfig,
    rng: ChaCha8Rng,
    scenario: Scenario,
    traffic: f64,
    step: u32,
    /// Smoothed cluster-wide degradation in [0, 1].
    cascade: f64,
    /// Per-sample cascade values, for offline inspection. Cleared on reset.
    cascade_log: Vec<f64>,
}

impl SyntheticCluster {
    /// Build a cluster, drawing the scenario if none is forced.
    pub fn new(config: SimConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let scenario = config
            .scenario
            .unwrap_or_else(|| Scenario::draw(&mut rng, &config.scenario_weights));
        debug!(scenario = %scenario, seed = config.seed, "synthetic cluster seeded");
        Self {
            config,
            rng,
            scenario,
            traffic: 0.0,
            step: 0,
            cascade: 0.0,
            cascade_log: Vec::new(),
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn traffic(&self) -> f64 {
        self.traffic
    }

    pub fn cascade(&self) -> f64 {
        self.cascade
    }

    pub fn cascade_log(&self) -> &[f64] {
        &self.cascade_log
    }

    /// Set the canary traffic fraction, clamped to [0, 1].
    ///
    /// Setting the same fraction twice is a no-op: nothing but the
    /// stored fraction depends on the call.
    pub fn set_traffic(&mut self, fraction: f64) {
        self.traffic = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    }

    /// Zero the session state: step counter, traffic, and cascade.
    ///
    /// The scenario drawn at construction is kept; build a new cluster
    /// for a fresh draw.
    pub fn reset(&mut self) {
        self.traffic = 0.0;
        self.step = 0;
        self.cascade = 0.0;
        self.cascade_log.clear();
    }

    /// Produce the next step's snapshot and advance the cascade once.
    pub fn sample(&mut self) -> MetricSnapshot {
        self.step += 1;
        let t = self.traffic;
        let elapsed = f64::from(self.step) / f64::from(self.config.horizon.max(1));

        let (raw_err, raw_p95) = self.local_signals(t, elapsed);
        let error_rate = raw_err.clamp(0.0, 1.0);
        let latency_p95_ms = raw_p95.max(0.0);

        // Errors burn extra CPU through retries.
        let cpu_usage =
            (0.15 + 0.5 * t + 2.5 * error_rate + self.noise(0.02)).clamp(0.0, 1.0);
        let mut mem = 0.2 + 0.35 * t;
        if self.scenario == Scenario::Degrading {
            // Leak term: grows with elapsed step fraction, not traffic.
            mem += 0.35 * elapsed;
        }
        let memory_usage = (mem + self.noise(0.01)).clamp(0.0, 1.0);

        // Exponential smoothing gives gradual build-up and gradual
        // recovery, modeling retry/timeout propagation delay.
        let downstream = f64::from(self.config.service_count.max(1)) - 1.0;
        let pressure = t * error_rate * downstream;
        self.cascade = (0.3 * pressure + 0.7 * self.cascade).clamp(0.0, 1.0);
        self.cascade_log.push(self.cascade);

        let services = f64::from(self.config.service_count.max(1));
        let cluster_error_rate =
            (0.004 + t * error_rate / services + 0.02 * self.cascade + self.noise(0.001))
                .clamp(0.0, 1.0);
        let end_to_end_latency_ms = (120.0
            + 0.5 * t * (latency_p95_ms - 100.0).max(0.0)
            + 200.0 * self.cascade
            + self.noise(5.0))
        .max(0.0);

        // Cascade back-pressure cuts throughput; a healthy canary adds a
        // small uplift with traffic.
        let uplift = if self.scenario == Scenario::Healthy { 0.1 * t } else { 0.0 };
        let request_rate =
            ((1.0 + uplift) * (1.0 - 0.5 * self.cascade) + self.noise(0.02)).clamp(0.0, 2.0);

        MetricSnapshot {
            error_rate,
            latency_p95_ms,
            cpu_usage,
            memory_usage,
            cluster_error_rate,
            end_to_end_latency_ms,
            request_rate,
        }
    }

    /// Scenario-specific canary error rate and p95 latency, noise included.
    fn local_signals(&mut self, t: f64, elapsed: f64) -> (f64, f64) {
        match self.scenario {
            Scenario::Healthy => (
                0.002 + 0.005 * t + self.noise(0.001),
                100.0 + 80.0 * t + self.noise(5.0),
            ),
            Scenario::Buggy => {
                if t > 0.0 {
                    // Above the 4% rollback threshold from the first
                    // shifted step, whatever the noise draw.
                    (
                        0.048 + 0.02 * t + self.noise(0.002),
                        150.0 + 60.0 * t + self.noise(10.0),
                    )
                } else {
                    (0.003 + self.noise(0.001), 150.0 + self.noise(10.0))
                }
            }
            Scenario::Degrading => (
                0.003 + 0.015 * t * (1.0 + 2.0 * elapsed) + self.noise(0.002),
                100.0 + 80.0 * t + 120.0 * elapsed + self.noise(5.0),
            ),
            Scenario::Flaky => {
                let mut err = 0.002 + 0.02 * t;
                let mut p95 = 100.0 + 80.0 * t;
                if t > 0.3 && self.rng.gen_bool(0.09) {
                    err += self.rng.gen_range(0.015..0.035);
                    p95 += self.rng.gen_range(80.0..160.0);
                }
                (err + self.noise(0.002), p95 + self.noise(5.0))
            }
        }
    }

    fn noise(&mut self, sigma: f64) -> f64 {
        let sigma = sigma * self.config.noise_scale.max(0.0);
        if sigma == 0.0 {
            return 0.0;
        }
        Normal::new(0.0, sigma)
            .map(|n| n.sample(&mut self.rng))
            .unwrap_or(0.0)
    }
}

/// Shared handle over one synthetic cluster.
///
/// Clones share the same cluster, so the control loop's source and sink
/// halves observe and mutate a single model.
#[derive(Clone)]
pub struct SimHandle {
    inner: Arc<Mutex<SyntheticCluster>>,
}

impl SimHandle {
    pub fn new(cluster: SyntheticCluster) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cluster)),
        }
    }

    pub async fn scenario(&self) -> Scenario {
        self.inner.lock().await.scenario()
    }

    pub async fn traffic(&self) -> f64 {
        self.inner.lock().await.traffic()
    }

    pub async fn cascade(&self) -> f64 {
        self.inner.lock().await.cascade()
    }

    pub async fn cascade_log(&self) -> Vec<f64> {
        self.inner.lock().await.cascade_log().to_vec()
    }
}

impl MetricsSource for SimHandle {
    async fn poll(&mut self) -> Result<MetricSnapshot, SourceError> {
        Ok(self.inner.lock().await.sample())
    }

    async fn reset(&mut self) -> Result<(), SourceError> {
        self.inner.lock().await.reset();
        Ok(())
    }
}

impl TrafficSink for SimHandle {
    async fn apply_weight(&mut self, percent: u8) -> Result<(), SinkError> {
        let fraction = f64::from(percent.min(100)) / 100.0;
        self.inner.lock().await.set_traffic(fraction);
        Ok(())
    }
}
