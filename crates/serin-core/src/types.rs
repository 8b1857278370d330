//! Rollout session state, actions, and the raw metrics contract.

use serde::{Deserialize, Serialize};

/// Status of a rollout session.
///
/// `Running` is the only non-terminal status. Once a session reaches a
/// terminal status it never transitions again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutStatus {
    /// Rollout in progress.
    Running,
    /// Canary reached full traffic with healthy signals.
    Succeeded,
    /// A safety breach forced canary traffic back to zero.
    RolledBack { reason: String },
    /// Step budget exhausted, or the session was stopped externally.
    TimedOut,
}

impl RolloutStatus {
    /// Whether this status ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RolloutStatus::Running)
    }
}

/// Traffic-shifting action decided once per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Leave the traffic split unchanged.
    Hold,
    /// Shift one step of traffic toward the canary.
    Increase,
    /// Shift one step of traffic back to stable.
    Decrease,
}

impl Action {
    /// Wire index used by external policies: 0=hold, 1=increase, 2=decrease.
    pub fn index(self) -> u32 {
        match self {
            Action::Hold => 0,
            Action::Increase => 1,
            Action::Decrease => 2,
        }
    }

    /// Decode a wire index. Anything outside 0..=2 is invalid.
    pub fn from_index(index: u32) -> Option<Action> {
        match index {
            0 => Some(Action::Hold),
            1 => Some(Action::Increase),
            2 => Some(Action::Decrease),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::Increase => "increase",
            Action::Decrease => "decrease",
        }
    }
}

/// Mutable state of one rollout session.
///
/// Created at session start, mutated once per step by the control loop,
/// and dropped when the session reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutState {
    /// Fraction of traffic currently routed to the canary.
    pub traffic_fraction: f64,
    /// Steps executed so far.
    pub step: u32,
    /// Step budget for the session.
    pub max_steps: u32,
    pub status: RolloutStatus,
    /// Scenario tag, set only for simulated sessions.
    pub scenario: Option<String>,
}

impl RolloutState {
    /// Fresh session: zero traffic, running.
    pub fn new(max_steps: u32) -> Self {
        Self {
            traffic_fraction: 0.0,
            step: 0,
            max_steps,
            status: RolloutStatus::Running,
            scenario: None,
        }
    }

    /// Apply an action, moving the fraction by `step_size`.
    ///
    /// The result is clamped to [0, 1] and snapped to a whole percent,
    /// which is the granularity the traffic sink accepts. Snapping also
    /// keeps repeated 0.1 steps from accumulating float drift, so ten
    /// increases land on exactly 1.0.
    pub fn apply(&mut self, action: Action, step_size: f64) {
        let next = match action {
            Action::Hold => return,
            Action::Increase => self.traffic_fraction + step_size,
            Action::Decrease => self.traffic_fraction - step_size,
        };
        self.traffic_fraction = (next.clamp(0.0, 1.0) * 100.0).round() / 100.0;
    }

    /// Traffic fraction as the integer percent the sink contract uses.
    pub fn traffic_percent(&self) -> u8 {
        (self.traffic_fraction * 100.0).round() as u8
    }
}

/// One timestep's raw signals from the canary and the cluster.
///
/// Rates and usages are fractions in [0, 1]; latencies are milliseconds;
/// `request_rate` is a throughput factor with nominal value 1.0. A
/// snapshot is consumed by the observation window immediately after it
/// is produced and not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Canary error rate.
    pub error_rate: f64,
    /// Canary p95 latency in milliseconds.
    pub latency_p95_ms: f64,
    /// Canary CPU usage.
    pub cpu_usage: f64,
    /// Canary memory usage.
    pub memory_usage: f64,
    /// Cluster-wide error rate.
    pub cluster_error_rate: f64,
    /// Cluster end-to-end latency in milliseconds.
    pub end_to_end_latency_ms: f64,
    /// Cluster throughput factor, nominal 1.0.
    pub request_rate: f64,
}

impl MetricSnapshot {
    /// Fallback used when a poll fails or a field is missing.
    ///
    /// The defaults describe an idle healthy system: no errors, baseline
    /// latencies, nominal throughput. A degraded poll therefore never
    /// triggers a rollback on its own.
    pub fn safe_default() -> Self {
        Self {
            error_rate: 0.0,
            latency_p95_ms: 100.0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            cluster_error_rate: 0.0,
            end_to_end_latency_ms: 120.0,
            request_rate: 1.0,
        }
    }
}
