//! Daemon configuration, loaded from `serin.toml`.
//!
//! Four sections: `[rollout]` paces the session, `[thresholds]` is the
//! shared safety envelope, `[policy]` tunes the rule policy, and
//! `[endpoints]` names the live deployment. Every field has a default,
//! so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use serin_core::config::{ConfigError, RolloutConfig, Thresholds, parse_duration};
use serin_policy::RulePolicyConfig;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub rollout: RolloutTuning,
    pub thresholds: Thresholds,
    pub policy: RulePolicyConfig,
    pub endpoints: EndpointsConfig,
}

/// Pacing and budget knobs, one TOML section.
///
/// Kept separate from [`Thresholds`] in the file so operators can tune
/// pacing without touching the safety envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutTuning {
    pub pacing: String,
    pub max_steps: u32,
    pub window_size: usize,
    pub traffic_step: f64,
}

impl Default for RolloutTuning {
    fn default() -> Self {
        let rollout = RolloutConfig::default();
        Self {
            pacing: rollout.pacing,
            max_steps: rollout.max_steps,
            window_size: rollout.window_size,
            traffic_step: rollout.traffic_step,
        }
    }
}

/// Endpoints of the live deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Base URL of the canary's metrics exposition.
    pub canary_metrics: String,
    /// Base URL of the cluster-wide metrics exposition, if one exists.
    pub cluster_metrics: Option<String>,
    /// Full URL the canary weight is written to.
    pub traffic: String,
    /// Per-request timeout for polls and weight writes.
    pub poll_timeout: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            canary_metrics: "http://127.0.0.1:9100".to_string(),
            cluster_metrics: None,
            traffic: "http://127.0.0.1:9200/routes/canary/weight".to_string(),
            poll_timeout: "2s".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load and validate a daemon configuration.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_duration(&self.endpoints.poll_timeout).is_none() {
            return Err(ConfigError::Invalid(format!(
                "poll_timeout '{}' is not a duration",
                self.endpoints.poll_timeout
            )));
        }
        self.rollout_config().validate()
    }

    /// Assemble the control-loop configuration from the file's sections.
    pub fn rollout_config(&self) -> RolloutConfig {
        RolloutConfig {
            pacing: self.rollout.pacing.clone(),
            max_steps: self.rollout.max_steps,
            window_size: self.rollout.window_size,
            traffic_step: self.rollout.traffic_step,
            thresholds: self.thresholds.clone(),
        }
    }

    /// Per-request probe timeout.
    pub fn poll_timeout(&self) -> Duration {
        parse_duration(&self.endpoints.poll_timeout).unwrap_or(Duration::from_secs(2))
    }
}
