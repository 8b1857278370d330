//! The per-step control loop and its session report.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use serin_core::config::{ConfigError, RolloutConfig};
use serin_core::contract::{MetricsSource, TrafficSink};
use serin_core::types::{Action, MetricSnapshot, RolloutState, RolloutStatus};
use serin_core::window::ObservationWindow;
use serin_policy::Policy;

#[derive(Debug, Error)]
pub enum ControlError {
    /// The session configuration failed validation before step one.
    #[error("rollout configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// One executed step, as kept in the session trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    /// Action the policy decided (or the hold it was degraded to).
    pub action: Action,
    /// Traffic fraction after the action was applied.
    pub traffic_after: f64,
    /// The raw signals this step was decided on.
    pub snapshot: MetricSnapshot,
}

/// Outcome of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutReport {
    pub status: RolloutStatus,
    /// Steps executed before the terminal status.
    pub steps: u32,
    /// Traffic fraction at session end; zero after a rollback.
    pub final_traffic: f64,
    /// Scenario tag, set only for simulated sessions.
    pub scenario: Option<String>,
    pub trace: Vec<StepRecord>,
}

/// Drives one rollout session to completion.
///
/// The controller owns the safety thresholds. The policy only paces the
/// rollout; rollback and success exits are decided here, on the raw
/// snapshot, no matter what the policy said.
pub struct RolloutController<S, K> {
    config: RolloutConfig,
    policy: Box<dyn Policy>,
    source: S,
    sink: K,
    state: RolloutState,
    window: ObservationWindow,
    trace: Vec<StepRecord>,
}

impl<S: MetricsSource, K: TrafficSink> RolloutController<S, K> {
    pub fn new(config: RolloutConfig, policy: Box<dyn Policy>, source: S, sink: K) -> Self {
        let state = RolloutState::new(config.max_steps);
        let window = ObservationWindow::new(config.window_size);
        Self {
            config,
            policy,
            source,
            sink,
            state,
            window,
            trace: Vec::new(),
        }
    }

    /// Tag the session with the scenario it runs against.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.state.scenario = Some(scenario.into());
        self
    }

    /// Run the session until a terminal status or a stop signal.
    ///
    /// A stop signal ends the session as `TimedOut` at the next pacing
    /// point, leaving whatever traffic split was last applied.
    pub async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<RolloutReport, ControlError> {
        self.config.validate()?;
        let interval = self.config.pacing_interval();

        info!(
            policy = self.policy.name(),
            max_steps = self.config.max_steps,
            window = self.config.window_size,
            pacing_ms = interval.as_millis() as u64,
            "rollout session started"
        );

        // Fresh counters for this session. Live traffic keeps flowing
        // either way, so a failed reset only skews the first window.
        if let Err(e) = self.source.reset().await {
            warn!(error = %e, "metrics source reset failed, continuing with stale counters");
        }

        while self.state.status == RolloutStatus::Running {
            self.state.step += 1;
            let step = self.state.step;

            let snapshot = match self.source.poll().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(step, error = %e, "metrics poll failed, substituting safe defaults");
                    MetricSnapshot::safe_default()
                }
            };

            let observation = self.window.observe(&snapshot, self.state.traffic_fraction);

            let action = match self.policy.decide(&observation) {
                Ok(action) => action,
                Err(e) => {
                    warn!(step, error = %e, "policy decision failed, holding traffic");
                    Action::Hold
                }
            };

            self.state.apply(action, self.config.traffic_step);
            let percent = self.state.traffic_percent();
            if let Err(e) = self.sink.apply_weight(percent).await {
                // The split stays wherever the sink last converged; the
                // next step pushes the full desired weight again.
                warn!(step, percent, error = %e, "traffic weight update failed");
            }

            info!(
                step,
                action = action.as_str(),
                traffic = self.state.traffic_fraction,
                error_local = snapshot.error_rate,
                error_cluster = snapshot.cluster_error_rate,
                latency_p95_ms = snapshot.latency_p95_ms,
                "rollout step"
            );

            self.trace.push(StepRecord {
                step,
                action,
                traffic_after: self.state.traffic_fraction,
                snapshot: snapshot.clone(),
            });

            if let Some(status) = self.exit_status(&snapshot) {
                self.finish(status).await;
                break;
            }

            if !interval.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => {
                        info!(step, "stop signal received, ending session");
                        self.state.status = RolloutStatus::TimedOut;
                    }
                }
            }
        }

        match &self.state.status {
            RolloutStatus::Succeeded => {
                info!(steps = self.state.step, "rollout succeeded");
            }
            RolloutStatus::RolledBack { reason } => {
                warn!(steps = self.state.step, reason = %reason, "rollout rolled back");
            }
            RolloutStatus::TimedOut => {
                warn!(
                    steps = self.state.step,
                    traffic = self.state.traffic_fraction,
                    "rollout timed out"
                );
            }
            RolloutStatus::Running => {}
        }

        Ok(RolloutReport {
            status: self.state.status,
            steps: self.state.step,
            final_traffic: self.state.traffic_fraction,
            scenario: self.state.scenario,
            trace: self.trace,
        })
    }

    /// Safety checks, in priority order: rollback beats success beats
    /// the step budget. The snapshot is pre-action; the traffic
    /// fraction is post-action.
    fn exit_status(&self, snapshot: &MetricSnapshot) -> Option<RolloutStatus> {
        let thresholds = &self.config.thresholds;

        if snapshot.error_rate > thresholds.rollback_error_local {
            return Some(RolloutStatus::RolledBack {
                reason: format!(
                    "local error rate {:.2}% over rollback threshold {:.2}%",
                    snapshot.error_rate * 100.0,
                    thresholds.rollback_error_local * 100.0
                ),
            });
        }
        if snapshot.cluster_error_rate > thresholds.rollback_error_cluster {
            return Some(RolloutStatus::RolledBack {
                reason: format!(
                    "cluster error rate {:.2}% over rollback threshold {:.2}%",
                    snapshot.cluster_error_rate * 100.0,
                    thresholds.rollback_error_cluster * 100.0
                ),
            });
        }

        if self.state.traffic_fraction >= 1.0
            && snapshot.error_rate < thresholds.success_error_local
            && snapshot.cluster_error_rate < thresholds.success_error_cluster
            && snapshot.latency_p95_ms < thresholds.slo_latency_local_ms
        {
            return Some(RolloutStatus::Succeeded);
        }

        if self.state.step >= self.state.max_steps {
            return Some(RolloutStatus::TimedOut);
        }
        None
    }

    /// Apply a terminal status. A rollback forces canary traffic to
    /// zero before the status is recorded.
    async fn finish(&mut self, status: RolloutStatus) {
        if let RolloutStatus::RolledBack { reason } = &status {
            warn!(step = self.state.step, reason = %reason, "shedding canary traffic");
            self.state.traffic_fraction = 0.0;
            if let Err(e) = self.sink.apply_weight(0).await {
                warn!(error = %e, "rollback weight update failed");
            }
        }
        self.state.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use serin_core::contract::{SinkError, SourceError};
    use serin_policy::PolicyError;

    struct FakeSource {
        script: VecDeque<Result<MetricSnapshot, SourceError>>,
        fallback: MetricSnapshot,
    }

    impl FakeSource {
        fn healthy() -> Self {
            Self {
                script: VecDeque::new(),
                fallback: healthy_snapshot(),
            }
        }

        fn scripted(script: Vec<Result<MetricSnapshot, SourceError>>) -> Self {
            Self {
                script: script.into(),
                fallback: healthy_snapshot(),
            }
        }
    }

    impl MetricsSource for FakeSource {
        async fn poll(&mut self) -> Result<MetricSnapshot, SourceError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        async fn reset(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        applied: Arc<Mutex<Vec<u8>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn applied(&self) -> Vec<u8> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl TrafficSink for RecordingSink {
        async fn apply_weight(&mut self, percent: u8) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Apply("injected sink failure".to_string()));
            }
            self.applied.lock().unwrap().push(percent);
            Ok(())
        }
    }

    struct ScriptedPolicy {
        actions: VecDeque<Result<Action, PolicyError>>,
        default: Action,
        seen_lengths: Arc<Mutex<Vec<usize>>>,
    }

    impl ScriptedPolicy {
        fn always(action: Action) -> Box<Self> {
            Box::new(Self {
                actions: VecDeque::new(),
                default: action,
                seen_lengths: Arc::default(),
            })
        }

        fn scripted(actions: Vec<Result<Action, PolicyError>>) -> Box<Self> {
            Box::new(Self {
                actions: actions.into(),
                default: Action::Hold,
                seen_lengths: Arc::default(),
            })
        }
    }

    impl Policy for ScriptedPolicy {
        fn name(&self) -> &str {
            "scripted"
        }

        fn decide(&mut self, observation: &[f64]) -> Result<Action, PolicyError> {
            self.seen_lengths.lock().unwrap().push(observation.len());
            self.actions.pop_front().unwrap_or(Ok(self.default))
        }
    }

    fn healthy_snapshot() -> MetricSnapshot {
        MetricSnapshot {
            error_rate: 0.003,
            latency_p95_ms: 120.0,
            cpu_usage: 0.3,
            memory_usage: 0.3,
            cluster_error_rate: 0.005,
            end_to_end_latency_ms: 130.0,
            request_rate: 1.0,
        }
    }

    fn breaching_snapshot() -> MetricSnapshot {
        MetricSnapshot {
            error_rate: 0.05,
            ..healthy_snapshot()
        }
    }

    fn fast_config(max_steps: u32) -> RolloutConfig {
        RolloutConfig {
            pacing: "0ms".to_string(),
            max_steps,
            window_size: 5,
            ..RolloutConfig::default()
        }
    }

    fn idle_stop() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn healthy_session_succeeds_after_ten_increases() {
        let sink = RecordingSink::default();
        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Increase),
            FakeSource::healthy(),
            sink.clone(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        assert_eq!(report.status, RolloutStatus::Succeeded);
        assert_eq!(report.steps, 10);
        assert_eq!(report.final_traffic, 1.0);
        assert_eq!(report.trace.len(), 10);
        assert_eq!(sink.applied(), vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[tokio::test]
    async fn observation_always_spans_the_whole_window() {
        let policy = ScriptedPolicy::always(Action::Increase);
        let lengths = policy.seen_lengths.clone();
        let controller = RolloutController::new(
            fast_config(30),
            policy,
            FakeSource::healthy(),
            RecordingSink::default(),
        );

        controller.run(idle_stop()).await.unwrap();

        let lengths = lengths.lock().unwrap();
        assert_eq!(lengths.len(), 10);
        assert!(lengths.iter().all(|&len| len == 5 * serin_core::NUM_CHANNELS));
    }

    #[tokio::test]
    async fn local_breach_rolls_back_and_sheds_traffic() {
        let sink = RecordingSink::default();
        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Increase),
            FakeSource::scripted(vec![
                Ok(healthy_snapshot()),
                Ok(healthy_snapshot()),
                Ok(breaching_snapshot()),
            ]),
            sink.clone(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        assert_eq!(report.steps, 3);
        assert_eq!(report.final_traffic, 0.0);
        match &report.status {
            RolloutStatus::RolledBack { reason } => {
                assert!(reason.contains("local error rate"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
        // The last weight pushed is the rollback to zero.
        assert_eq!(sink.applied(), vec![10, 20, 30, 0]);
    }

    #[tokio::test]
    async fn cluster_breach_rolls_back() {
        let snapshot = MetricSnapshot {
            cluster_error_rate: 0.08,
            ..healthy_snapshot()
        };
        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Increase),
            FakeSource::scripted(vec![Ok(snapshot)]),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        assert_eq!(report.steps, 1);
        match &report.status {
            RolloutStatus::RolledBack { reason } => {
                assert!(reason.contains("cluster error rate"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_breach_reported_before_cluster_breach() {
        let snapshot = MetricSnapshot {
            error_rate: 0.05,
            cluster_error_rate: 0.09,
            ..healthy_snapshot()
        };
        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Hold),
            FakeSource::scripted(vec![Ok(snapshot)]),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();
        match &report.status {
            RolloutStatus::RolledBack { reason } => {
                assert!(reason.contains("local error rate"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rollback_wins_over_success_at_full_traffic() {
        // Ninth increase reaches 0.9; the tenth step's snapshot breaches
        // while the action takes traffic to 1.0.
        let mut script: Vec<Result<MetricSnapshot, SourceError>> =
            (0..9).map(|_| Ok(healthy_snapshot())).collect();
        script.push(Ok(breaching_snapshot()));

        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Increase),
            FakeSource::scripted(script),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();
        assert_eq!(report.steps, 10);
        assert!(matches!(report.status, RolloutStatus::RolledBack { .. }));
        assert_eq!(report.final_traffic, 0.0);
    }

    #[tokio::test]
    async fn step_budget_exhaustion_times_out() {
        let controller = RolloutController::new(
            fast_config(7),
            ScriptedPolicy::always(Action::Hold),
            FakeSource::healthy(),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        assert_eq!(report.status, RolloutStatus::TimedOut);
        assert_eq!(report.steps, 7);
        assert_eq!(report.final_traffic, 0.0);
    }

    #[tokio::test]
    async fn source_failure_degrades_to_safe_defaults() {
        let controller = RolloutController::new(
            fast_config(3),
            ScriptedPolicy::always(Action::Hold),
            FakeSource::scripted(vec![
                Err(SourceError::Poll("connection refused".to_string())),
                Err(SourceError::Timeout(2000)),
                Err(SourceError::Status(503)),
            ]),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        // Safe defaults never trip a rollback; the budget ends the run.
        assert_eq!(report.status, RolloutStatus::TimedOut);
        assert_eq!(report.trace.len(), 3);
        for record in &report.trace {
            assert_eq!(record.snapshot, MetricSnapshot::safe_default());
        }
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_the_session() {
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let controller = RolloutController::new(
            fast_config(30),
            ScriptedPolicy::always(Action::Increase),
            FakeSource::healthy(),
            sink.clone(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        // Internal state advances even when no weight lands.
        assert_eq!(report.status, RolloutStatus::Succeeded);
        assert_eq!(report.final_traffic, 1.0);
        assert!(sink.applied().is_empty());
    }

    #[tokio::test]
    async fn policy_failure_degrades_to_hold() {
        let controller = RolloutController::new(
            fast_config(2),
            ScriptedPolicy::scripted(vec![
                Err(PolicyError::InvalidAction(9)),
                Ok(Action::Increase),
            ]),
            FakeSource::healthy(),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();

        assert_eq!(report.trace[0].action, Action::Hold);
        assert_eq!(report.trace[0].traffic_after, 0.0);
        assert_eq!(report.trace[1].action, Action::Increase);
        assert_eq!(report.trace[1].traffic_after, 0.1);
    }

    #[tokio::test]
    async fn invalid_configuration_is_fatal_before_step_one() {
        let config = RolloutConfig {
            window_size: 0,
            ..fast_config(10)
        };
        let sink = RecordingSink::default();
        let controller = RolloutController::new(
            config,
            ScriptedPolicy::always(Action::Increase),
            FakeSource::healthy(),
            sink.clone(),
        );

        let result = controller.run(idle_stop()).await;

        assert!(matches!(result, Err(ControlError::Config(_))));
        assert!(sink.applied().is_empty());
    }

    #[tokio::test]
    async fn stop_signal_ends_the_session_as_timed_out() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let config = RolloutConfig {
            pacing: "10s".to_string(),
            ..fast_config(100)
        };
        let controller = RolloutController::new(
            config,
            ScriptedPolicy::always(Action::Hold),
            FakeSource::healthy(),
            RecordingSink::default(),
        );

        let report = controller.run(rx).await.unwrap();

        assert_eq!(report.status, RolloutStatus::TimedOut);
        assert_eq!(report.steps, 1);
    }

    #[tokio::test]
    async fn scenario_tag_propagates_to_the_report() {
        let controller = RolloutController::new(
            fast_config(1),
            ScriptedPolicy::always(Action::Hold),
            FakeSource::healthy(),
            RecordingSink::default(),
        )
        .with_scenario("healthy");

        let report = controller.run(idle_stop()).await.unwrap();
        assert_eq!(report.scenario.as_deref(), Some("healthy"));
    }

    #[tokio::test]
    async fn decrease_floors_at_zero() {
        let controller = RolloutController::new(
            fast_config(3),
            ScriptedPolicy::scripted(vec![
                Ok(Action::Increase),
                Ok(Action::Decrease),
                Ok(Action::Decrease),
            ]),
            FakeSource::healthy(),
            RecordingSink::default(),
        );

        let report = controller.run(idle_stop()).await.unwrap();
        let fractions: Vec<f64> = report.trace.iter().map(|r| r.traffic_after).collect();
        assert_eq!(fractions, vec![0.1, 0.0, 0.0]);
    }
}
