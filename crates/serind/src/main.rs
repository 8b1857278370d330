//! serind — the Serin rollout daemon.
//!
//! Single binary with three modes:
//! - `run`: drive a live canary through the configured HTTP endpoints
//! - `simulate`: one rollout against the synthetic cluster
//! - `evaluate`: compare policies over batches of seeded episodes
//!
//! # Usage
//!
//! ```text
//! serind run --config serin.toml
//! serind simulate --scenario buggy --seed 7
//! serind evaluate --episodes 50 --scenario random
//! ```

mod config;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use serin_control::{RolloutController, RolloutReport};
use serin_core::config::{RolloutConfig, Thresholds};
use serin_core::types::RolloutStatus;
use serin_eval::{EvalConfig, evaluate_policy, render_table, score_rollout, score_step};
use serin_policy::{ExternalPolicy, RulePolicy, RulePolicyConfig};
use serin_probe::{HttpMetricsSource, HttpTrafficSink};
use serin_sim::{Scenario, SimConfig, SimHandle, SyntheticCluster};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "serind", about = "Serin rollout daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a live canary rollout through the configured endpoints.
    Run {
        /// Path to the daemon configuration file.
        #[arg(long, default_value = "serin.toml")]
        config: PathBuf,
    },

    /// Run one simulated rollout and print the step table.
    Simulate {
        /// Scenario to force, or "random" to draw one by weight.
        #[arg(long, default_value = "random")]
        scenario: String,

        /// Seed for the synthetic cluster.
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Step budget.
        #[arg(long, default_value = "100")]
        max_steps: u32,

        /// Observation window rows.
        #[arg(long, default_value = "10")]
        window: usize,

        /// Write the full step trace to this file as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compare the rule policy against an always-increase baseline.
    Evaluate {
        /// Episodes per policy.
        #[arg(long, default_value = "20")]
        episodes: u32,

        /// Base seed; episode i seeds its cluster with seed + i.
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Scenario to force, or "random" to draw per episode.
        #[arg(long, default_value = "random")]
        scenario: String,

        /// Step budget per episode.
        #[arg(long, default_value = "100")]
        max_steps: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,serind=debug,serin_control=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run_online(&config).await,
        Command::Simulate {
            scenario,
            seed,
            max_steps,
            window,
            report,
        } => run_simulation(&scenario, seed, max_steps, window, report.as_deref()).await,
        Command::Evaluate {
            episodes,
            seed,
            scenario,
            max_steps,
        } => run_evaluation(episodes, seed, &scenario, max_steps).await,
    }
}

async fn run_online(path: &Path) -> anyhow::Result<()> {
    let daemon = DaemonConfig::from_file(path)?;
    let rollout = daemon.rollout_config();
    let timeout = daemon.poll_timeout();

    info!(config = %path.display(), "serin daemon starting in online mode");

    let source = HttpMetricsSource::new(
        &daemon.endpoints.canary_metrics,
        daemon.endpoints.cluster_metrics.as_deref(),
        timeout,
    )?;
    let sink = HttpTrafficSink::new(&daemon.endpoints.traffic, timeout)?;
    let policy = RulePolicy::new(daemon.policy.clone(), &rollout.thresholds);
    let controller = RolloutController::new(rollout, Box::new(policy), source, sink);

    // Ctrl-C flips the stop channel; the controller exits at the next
    // pacing point without applying further actions.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = stop_tx.send(true);
    });

    let report = controller.run(stop_rx).await?;
    print_summary(&report);
    Ok(())
}

async fn run_simulation(
    scenario: &str,
    seed: u64,
    max_steps: u32,
    window: usize,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let sim = SimConfig {
        seed,
        scenario: parse_scenario(scenario)?,
        ..SimConfig::default()
    };
    let handle = SimHandle::new(SyntheticCluster::new(sim));
    let drawn = handle.scenario().await;

    let rollout = RolloutConfig {
        pacing: "0ms".to_string(),
        max_steps,
        window_size: window,
        ..RolloutConfig::default()
    };
    let thresholds = rollout.thresholds.clone();
    let policy = RulePolicy::new(RulePolicyConfig::default(), &thresholds);

    let controller =
        RolloutController::new(rollout, Box::new(policy), handle.clone(), handle.clone())
            .with_scenario(drawn.as_str());
    let (_stop_tx, stop_rx) = watch::channel(false);
    let report = controller.run(stop_rx).await?;

    print_step_table(&report, &handle.cascade_log().await, &thresholds);
    print_summary(&report);
    println!(">>> score {:.2}", score_rollout(&report, &thresholds));

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        info!(path = %path.display(), "step trace written");
    }
    Ok(())
}

async fn run_evaluation(
    episodes: u32,
    seed: u64,
    scenario: &str,
    max_steps: u32,
) -> anyhow::Result<()> {
    let config = EvalConfig {
        episodes,
        base_seed: seed,
        scenario: parse_scenario(scenario)?,
        max_steps,
        ..EvalConfig::default()
    };

    let rule = evaluate_policy(&config, "rule", || {
        Box::new(RulePolicy::new(
            RulePolicyConfig::default(),
            &Thresholds::default(),
        ))
    })
    .await?;
    // The baseline goes through the external adapter so both policy
    // paths get exercised by the comparison.
    let baseline = evaluate_policy(&config, "always-increase", || {
        Box::new(ExternalPolicy::new("always-increase", Box::new(|_| Ok(1))))
    })
    .await?;

    print!("{}", render_table(&[rule, baseline]));
    Ok(())
}

fn parse_scenario(s: &str) -> anyhow::Result<Option<Scenario>> {
    if s.eq_ignore_ascii_case("random") {
        Ok(None)
    } else {
        Ok(Some(s.parse()?))
    }
}

fn print_step_table(report: &RolloutReport, cascade: &[f64], thresholds: &Thresholds) {
    println!(
        "scenario: {}",
        report.scenario.as_deref().unwrap_or("unknown")
    );
    let header = format!(
        "{:>4} {:>8} | {:>5} {:>6} {:>6} {:>5} {:>5} | {:>6} {:>6} {:>5} {:>5} | {:>7}",
        "step",
        "action",
        "traf%",
        "errL%",
        "p95ms",
        "cpu%",
        "mem%",
        "errG%",
        "e2ems",
        "rrate",
        "casc",
        "score"
    );
    println!("{header}");
    println!("{}", "-".repeat(header.len()));

    for record in &report.trace {
        let s = &record.snapshot;
        let casc = cascade
            .get(record.step as usize - 1)
            .copied()
            .unwrap_or(0.0);
        let score = score_step(s, record.traffic_after, record.action, thresholds);
        println!(
            "{:>4} {:>8} | {:>5.0} {:>6.2} {:>6.1} {:>5.1} {:>5.1} | {:>6.2} {:>6.1} {:>5.2} {:>5.3} | {:>7.2}",
            record.step,
            record.action.as_str(),
            record.traffic_after * 100.0,
            s.error_rate * 100.0,
            s.latency_p95_ms,
            s.cpu_usage * 100.0,
            s.memory_usage * 100.0,
            s.cluster_error_rate * 100.0,
            s.end_to_end_latency_ms,
            s.request_rate,
            casc,
            score,
        );
    }
}

fn print_summary(report: &RolloutReport) {
    let status = match &report.status {
        RolloutStatus::Running => "RUNNING".to_string(),
        RolloutStatus::Succeeded => "SUCCEEDED".to_string(),
        RolloutStatus::RolledBack { reason } => format!("ROLLED_BACK ({reason})"),
        RolloutStatus::TimedOut => "TIMED_OUT".to_string(),
    };
    println!(
        "\n>>> {status} | steps {} | final traffic {:.0}%",
        report.steps,
        report.final_traffic * 100.0
    );
}
