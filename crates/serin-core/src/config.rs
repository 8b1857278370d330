//! Rollout configuration and shared safety thresholds.
//!
//! One `Thresholds` value is constructed per session and lent to both the
//! control loop (termination checks) and the rule policy (SLO rules), so
//! the two sides can never disagree about what "unhealthy" means.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Safety thresholds for one rollout session.
///
/// The rollback thresholds are looser than the success thresholds on
/// purpose: a session rolls back the moment a signal is clearly bad, but
/// only succeeds when every signal is clearly good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Local error rate that forces an immediate rollback.
    pub rollback_error_local: f64,
    /// Cluster-wide error rate that forces an immediate rollback.
    pub rollback_error_cluster: f64,
    /// Local error rate that must hold for a success exit.
    pub success_error_local: f64,
    /// Cluster-wide error rate that must hold for a success exit.
    pub success_error_cluster: f64,
    /// Canary p95 latency SLO in milliseconds.
    pub slo_latency_local_ms: f64,
    /// End-to-end latency SLO in milliseconds.
    pub slo_latency_e2e_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rollback_error_local: 0.04,
            rollback_error_cluster: 0.06,
            success_error_local: 0.02,
            success_error_cluster: 0.02,
            slo_latency_local_ms: 200.0,
            slo_latency_e2e_ms: 250.0,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("rollback_error_local", self.rollback_error_local),
            ("rollback_error_cluster", self.rollback_error_cluster),
            ("success_error_local", self.success_error_local),
            ("success_error_cluster", self.success_error_cluster),
            ("slo_latency_local_ms", self.slo_latency_local_ms),
            ("slo_latency_e2e_ms", self.slo_latency_e2e_ms),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.success_error_local >= self.rollback_error_local {
            return Err(ConfigError::Invalid(
                "success_error_local must be below rollback_error_local".to_string(),
            ));
        }
        if self.success_error_cluster >= self.rollback_error_cluster {
            return Err(ConfigError::Invalid(
                "success_error_cluster must be below rollback_error_cluster".to_string(),
            ));
        }
        Ok(())
    }
}

/// Control-loop configuration.
///
/// `Default` carries the documented defaults; any subset can be
/// overridden from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Pause between steps, e.g. "10s" or "500ms".
    pub pacing: String,
    /// Step budget before the session times out.
    pub max_steps: u32,
    /// Number of normalized vectors kept in the observation window.
    pub window_size: usize,
    /// Traffic fraction moved by one increase/decrease.
    pub traffic_step: f64,
    pub thresholds: Thresholds,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            pacing: "10s".to_string(),
            max_steps: 100,
            window_size: 10,
            traffic_step: 0.1,
            thresholds: Thresholds::default(),
        }
    }
}

impl RolloutConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RolloutConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Called before any step executes; a
    /// failure here is fatal to the session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_duration(&self.pacing).is_none() {
            return Err(ConfigError::Invalid(format!(
                "pacing '{}' is not a duration",
                self.pacing
            )));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".to_string()));
        }
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".to_string()));
        }
        if !(self.traffic_step > 0.0 && self.traffic_step <= 1.0) {
            return Err(ConfigError::Invalid(
                "traffic_step must be in (0, 1]".to_string(),
            ));
        }
        self.thresholds.validate()
    }

    /// Pacing interval as a `Duration`.
    pub fn pacing_interval(&self) -> Duration {
        parse_duration(&self.pacing).unwrap_or(Duration::from_secs(10))
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
