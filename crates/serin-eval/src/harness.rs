//! Seeded multi-episode evaluation through the real control loop.
//!
//! Every episode wires a fresh synthetic cluster to a fresh policy and
//! runs the same `RolloutController` the online path uses. There is no
//! parallel evaluation loop to drift out of sync with the real one:
//! what gets scored is exactly what would have run.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use serin_control::{ControlError, RolloutController};
use serin_core::config::RolloutConfig;
use serin_core::types::RolloutStatus;
use serin_policy::Policy;
use serin_sim::{Scenario, SimConfig, SimHandle, SyntheticCluster};

use crate::score::score_rollout;

/// Evaluation harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Episodes per policy.
    pub episodes: u32,
    /// Episode `i` seeds its cluster with `base_seed + i`, so two
    /// policies evaluated under one config see identical clusters.
    pub base_seed: u64,
    /// Forced scenario; `None` draws one per episode by weight.
    pub scenario: Option<Scenario>,
    /// Step budget per episode.
    pub max_steps: u32,
    /// Observation window rows.
    pub window_size: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            episodes: 20,
            base_seed: 1,
            scenario: None,
            max_steps: 100,
            window_size: 10,
        }
    }
}

/// Aggregate outcome of one policy's evaluation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySummary {
    pub policy: String,
    pub episodes: u32,
    pub successes: u32,
    pub rollbacks: u32,
    pub timeouts: u32,
    pub mean_score: f64,
    pub mean_steps: f64,
    pub mean_final_traffic: f64,
}

impl PolicySummary {
    pub fn success_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.episodes)
        }
    }
}

/// Run one policy through `config.episodes` seeded simulated rollouts.
///
/// `make_policy` is called once per episode so stateful policies start
/// every episode cold. Episodes run at zero pacing under the default
/// safety thresholds.
pub async fn evaluate_policy<F>(
    config: &EvalConfig,
    name: &str,
    mut make_policy: F,
) -> Result<PolicySummary, ControlError>
where
    F: FnMut() -> Box<dyn Policy>,
{
    let rollout = RolloutConfig {
        pacing: "0ms".to_string(),
        max_steps: config.max_steps,
        window_size: config.window_size,
        ..RolloutConfig::default()
    };
    let thresholds = rollout.thresholds.clone();

    let mut successes = 0u32;
    let mut rollbacks = 0u32;
    let mut timeouts = 0u32;
    let mut score_sum = 0.0;
    let mut step_sum = 0.0;
    let mut traffic_sum = 0.0;

    for episode in 0..config.episodes {
        let sim = SimConfig {
            seed: config.base_seed + u64::from(episode),
            scenario: config.scenario,
            ..SimConfig::default()
        };
        let handle = SimHandle::new(SyntheticCluster::new(sim));
        let scenario = handle.scenario().await;

        let controller = RolloutController::new(
            rollout.clone(),
            make_policy(),
            handle.clone(),
            handle.clone(),
        )
        .with_scenario(scenario.as_str());

        let (_stop_tx, stop_rx) = watch::channel(false);
        let report = controller.run(stop_rx).await?;

        match report.status {
            RolloutStatus::Succeeded => successes += 1,
            RolloutStatus::RolledBack { .. } => rollbacks += 1,
            RolloutStatus::Running | RolloutStatus::TimedOut => timeouts += 1,
        }
        let score = score_rollout(&report, &thresholds);
        score_sum += score;
        step_sum += f64::from(report.steps);
        traffic_sum += report.final_traffic;

        debug!(
            policy = name,
            episode,
            scenario = %scenario,
            steps = report.steps,
            score,
            "evaluation episode finished"
        );
    }

    let n = f64::from(config.episodes.max(1));
    let summary = PolicySummary {
        policy: name.to_string(),
        episodes: config.episodes,
        successes,
        rollbacks,
        timeouts,
        mean_score: score_sum / n,
        mean_steps: step_sum / n,
        mean_final_traffic: traffic_sum / n,
    };
    info!(
        policy = name,
        successes, rollbacks, timeouts, mean_score = summary.mean_score, "evaluation finished"
    );
    Ok(summary)
}

/// Render summaries as a fixed-width comparison table, one row per policy.
pub fn render_table(summaries: &[PolicySummary]) -> String {
    let mut out = String::new();
    let header = format!(
        "{:<18} {:>4} {:>5} {:>5} {:>5} {:>6} {:>11} {:>11} {:>10}",
        "policy", "ep", "succ", "roll", "tout", "succ%", "mean score", "mean steps", "mean traf"
    );
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(header.len()));
    out.push('\n');
    for summary in summaries {
        out.push_str(&format!(
            "{:<18} {:>4} {:>5} {:>5} {:>5} {:>5.0}% {:>11.2} {:>11.1} {:>10.2}\n",
            summary.policy,
            summary.episodes,
            summary.successes,
            summary.rollbacks,
            summary.timeouts,
            summary.success_rate() * 100.0,
            summary.mean_score,
            summary.mean_steps,
            summary.mean_final_traffic,
        ));
    }
    out
}
