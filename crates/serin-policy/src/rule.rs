//! Rule-based policy: a fixed chain of threshold and trend checks.
//!
//! Rules are evaluated in a strict order and the first match wins:
//! critical errors shed traffic, rising error trends and SLO or
//! saturation pressure pause, and the rollout only advances when both
//! error rates are clearly safe. Everything else holds, so the policy
//! fails toward caution.

use serde::{Deserialize, Serialize};
use tracing::debug;

use serin_core::config::Thresholds;
use serin_core::types::Action;
use serin_core::window::{
    CH_CPU, CH_ERROR_CLUSTER, CH_ERROR_LOCAL, CH_LATENCY_E2E, CH_LATENCY_P95, CH_MEMORY,
    LATENCY_E2E_SCALE_MS, LATENCY_P95_SCALE_MS, NUM_CHANNELS,
};

use crate::{Policy, PolicyError, observation_rows};

/// Tunables for [`RulePolicy`].
///
/// All error and saturation values compare against normalized channels,
/// so rates and usages are fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePolicyConfig {
    /// Local error rate above which traffic is shed immediately.
    pub error_critical_local: f64,
    /// Cluster error rate above which traffic is shed immediately.
    pub error_critical_cluster: f64,
    /// Both error rates must sit below this for the rollout to advance.
    pub error_safe: f64,
    /// Per-row error slope above which the rollout pauses.
    pub trend_slope_threshold: f64,
    /// Window rows the trend regression looks at.
    pub trend_points: usize,
    /// CPU usage at or above which the rollout pauses.
    pub cpu_saturation: f64,
    /// Memory usage at or above which the rollout pauses.
    pub mem_saturation: f64,
}

impl Default for RulePolicyConfig {
    fn default() -> Self {
        Self {
            error_critical_local: 0.02,
            error_critical_cluster: 0.03,
            error_safe: 0.01,
            trend_slope_threshold: 0.002,
            trend_points: 5,
            cpu_saturation: 0.9,
            mem_saturation: 0.9,
        }
    }
}

/// Threshold-and-trend policy over the latest observation row.
///
/// Latency SLOs come from the shared [`Thresholds`] and are converted
/// to normalized channel units once at construction.
pub struct RulePolicy {
    config: RulePolicyConfig,
    /// `slo_latency_local_ms`, in p95 channel units.
    slo_p95_norm: f64,
    /// `slo_latency_e2e_ms`, in end-to-end channel units.
    slo_e2e_norm: f64,
}

impl RulePolicy {
    pub fn new(config: RulePolicyConfig, thresholds: &Thresholds) -> Self {
        Self {
            config,
            slo_p95_norm: thresholds.slo_latency_local_ms / LATENCY_P95_SCALE_MS,
            slo_e2e_norm: thresholds.slo_latency_e2e_ms / LATENCY_E2E_SCALE_MS,
        }
    }

    /// First matching rule wins; returns the action and the rule name.
    fn classify(&self, observation: &[f64], rows: usize) -> (Action, &'static str) {
        let latest = &observation[(rows - 1) * NUM_CHANNELS..rows * NUM_CHANNELS];
        let err_local = latest[CH_ERROR_LOCAL];
        let err_cluster = latest[CH_ERROR_CLUSTER];

        if err_local > self.config.error_critical_local {
            return (Action::Decrease, "critical_local_error");
        }
        if err_cluster > self.config.error_critical_cluster {
            return (Action::Decrease, "critical_cluster_error");
        }

        let points = self.config.trend_points.min(rows).max(1);
        let local_slope = ols_slope(&channel_tail(observation, CH_ERROR_LOCAL, points));
        let cluster_slope = ols_slope(&channel_tail(observation, CH_ERROR_CLUSTER, points));
        if local_slope > self.config.trend_slope_threshold
            || cluster_slope > self.config.trend_slope_threshold
        {
            return (Action::Hold, "rising_error_trend");
        }

        if latest[CH_LATENCY_P95] > self.slo_p95_norm || latest[CH_LATENCY_E2E] > self.slo_e2e_norm
        {
            return (Action::Hold, "latency_over_slo");
        }
        if latest[CH_CPU] >= self.config.cpu_saturation
            || latest[CH_MEMORY] >= self.config.mem_saturation
        {
            return (Action::Hold, "resource_saturation");
        }

        if err_local < self.config.error_safe && err_cluster < self.config.error_safe {
            return (Action::Increase, "errors_safe");
        }
        (Action::Hold, "default")
    }
}

impl Policy for RulePolicy {
    fn name(&self) -> &str {
        "rule"
    }

    fn decide(&mut self, observation: &[f64]) -> Result<Action, PolicyError> {
        let rows = observation_rows(observation)?;
        let (action, rule) = self.classify(observation, rows);
        debug!(rule, action = action.as_str(), "rule policy decision");
        Ok(action)
    }
}

/// Last `points` values of one channel, oldest first.
fn channel_tail(observation: &[f64], channel: usize, points: usize) -> Vec<f64> {
    let rows = observation.len() / NUM_CHANNELS;
    let take = points.min(rows);
    (rows - take..rows)
        .map(|row| observation[row * NUM_CHANNELS + channel])
        .collect()
}

/// Ordinary least-squares slope over evenly spaced samples.
///
/// Fewer than two points have no trend and yield 0.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n as f64 - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
