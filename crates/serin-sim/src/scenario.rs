//! Failure-mode profiles for the synthetic cluster.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A named failure-mode template for one simulated rollout.
///
/// The profile parametrizes the error, latency, and resource generators
/// in the synthetic cluster. One is drawn per rollout, or forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Error and latency grow slowly and boundedly with traffic; low noise.
    Healthy,
    /// Elevated error and latency from the first shifted step.
    Buggy,
    /// Baselines climb with elapsed step fraction, like a leak or
    /// slow resource exhaustion.
    Degrading,
    /// Low baseline with rare large transient spikes once traffic is
    /// past a gate.
    Flaky,
}

/// Default draw weights, in `Scenario::ALL` order.
pub const DEFAULT_WEIGHTS: [f64; 4] = [0.60, 0.20, 0.15, 0.05];

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Healthy,
        Scenario::Buggy,
        Scenario::Degrading,
        Scenario::Flaky,
    ];

    /// Draw one scenario according to `weights` (same order as `ALL`).
    ///
    /// Weights need not sum to 1; they are treated as relative. All-zero
    /// weights fall back to `Healthy`.
    pub fn draw(rng: &mut impl Rng, weights: &[f64; 4]) -> Scenario {
        let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 {
            return Scenario::Healthy;
        }
        let mut roll = rng.gen_range(0.0..total);
        for (scenario, weight) in Scenario::ALL.iter().zip(weights) {
            if *weight <= 0.0 {
                continue;
            }
            if roll < *weight {
                return *scenario;
            }
            roll -= weight;
        }
        Scenario::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Healthy => "healthy",
            Scenario::Buggy => "buggy",
            Scenario::Degrading => "degrading",
            Scenario::Flaky => "flaky",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Scenario::Healthy),
            "buggy" => Ok(Scenario::Buggy),
            "degrading" => Ok(Scenario::Degrading),
            "flaky" => Ok(Scenario::Flaky),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

/// Error for a scenario name outside the four profiles.
#[derive(Debug, thiserror::Error)]
#[error("unknown scenario '{0}', expected healthy|buggy|degrading|flaky")]
pub struct UnknownScenario(String);
