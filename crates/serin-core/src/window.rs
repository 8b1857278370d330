//! Signal normalization and the sliding observation window.
//!
//! A decision policy never sees raw metrics. Each step's snapshot is
//! normalized into an 8-channel vector with every component clamped to
//! [0, 1], pushed into a fixed-capacity ring buffer, and handed to the
//! policy as the flattened window. The window is pre-filled with zero
//! vectors so the flattened shape is identical from the first step on.

use crate::types::MetricSnapshot;

/// Number of channels in a normalized signal vector.
pub const NUM_CHANNELS: usize = 8;

/// Canary p95 latency saturates at this many milliseconds.
pub const LATENCY_P95_SCALE_MS: f64 = 500.0;
/// End-to-end latency saturates at this many milliseconds.
pub const LATENCY_E2E_SCALE_MS: f64 = 1000.0;
/// Request-rate factor saturates at this multiple of nominal throughput,
/// so nominal (1.0) sits at channel value 0.5 and back-pressure is
/// visible as movement below it.
pub const REQUEST_RATE_SCALE: f64 = 2.0;

// Channel indices into a normalized vector.
pub const CH_ERROR_LOCAL: usize = 0;
pub const CH_LATENCY_P95: usize = 1;
pub const CH_CPU: usize = 2;
pub const CH_MEMORY: usize = 3;
pub const CH_ERROR_CLUSTER: usize = 4;
pub const CH_LATENCY_E2E: usize = 5;
pub const CH_REQUEST_RATE: usize = 6;
pub const CH_TRAFFIC: usize = 7;

/// One snapshot normalized into [0, 1] per channel.
pub type NormalizedVector = [f64; NUM_CHANNELS];

/// Normalize a raw snapshot plus the current traffic fraction.
///
/// Every component is clamped to [0, 1] no matter how large the raw
/// input is; normalization never fails.
pub fn normalize(snapshot: &MetricSnapshot, traffic_fraction: f64) -> NormalizedVector {
    let mut v = [0.0; NUM_CHANNELS];
    v[CH_ERROR_LOCAL] = clamp01(snapshot.error_rate);
    v[CH_LATENCY_P95] = clamp01(snapshot.latency_p95_ms / LATENCY_P95_SCALE_MS);
    v[CH_CPU] = clamp01(snapshot.cpu_usage);
    v[CH_MEMORY] = clamp01(snapshot.memory_usage);
    v[CH_ERROR_CLUSTER] = clamp01(snapshot.cluster_error_rate);
    v[CH_LATENCY_E2E] = clamp01(snapshot.end_to_end_latency_ms / LATENCY_E2E_SCALE_MS);
    v[CH_REQUEST_RATE] = clamp01(snapshot.request_rate / REQUEST_RATE_SCALE);
    v[CH_TRAFFIC] = clamp01(traffic_fraction);
    v
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Fixed-capacity ring buffer of the last `size` normalized vectors.
///
/// Implemented as a pre-allocated slot array plus a head index; a push
/// overwrites the oldest slot and never reallocates. The buffer starts
/// zero-filled, so `flatten()` returns `size * 8` values from the first
/// push onward.
#[derive(Debug, Clone)]
pub struct ObservationWindow {
    slots: Vec<NormalizedVector>,
    /// Next write position; also the oldest entry.
    head: usize,
}

impl ObservationWindow {
    /// Create a window of `size` zero vectors.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![[0.0; NUM_CHANNELS]; size.max(1)],
            head: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Push a vector, evicting the oldest entry.
    pub fn push(&mut self, vector: NormalizedVector) {
        self.slots[self.head] = vector;
        self.head = (self.head + 1) % self.slots.len();
    }

    /// Flatten the window oldest-first into `size * 8` values.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.slots.len() * NUM_CHANNELS);
        for i in 0..self.slots.len() {
            out.extend_from_slice(&self.slots[(self.head + i) % self.slots.len()]);
        }
        out
    }

    /// Normalize a snapshot, push it, and return the flattened window.
    ///
    /// This is the one call the control loop makes per step. It is
    /// deterministic given the snapshot and fraction.
    pub fn observe(&mut self, snapshot: &MetricSnapshot, traffic_fraction: f64) -> Vec<f64> {
        self.push(normalize(snapshot, traffic_fraction));
        self.flatten()
    }
}
