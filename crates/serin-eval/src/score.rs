//! Step and rollout scoring.
//!
//! The score is a shaped scalar: progress pays super-linearly, unhealthy
//! signals cost proportionally, and a handful of action-shaping terms
//! separate policies that pace a rollout well from policies that merely
//! survive it. Only the evaluation harness consumes scores; the control
//! loop's termination logic never sees them.

use serin_control::RolloutReport;
use serin_core::config::Thresholds;
use serin_core::types::{Action, MetricSnapshot, RolloutStatus};

/// Local error rate above which holding or backing off earns credit.
const ERR_ELEVATED: f64 = 0.025;
/// Local error rate below which the canary counts as clearly healthy.
const ERR_LOW: f64 = 0.015;
/// CPU or memory usage above which a resource penalty accrues.
const SATURATION: f64 = 0.9;

/// Outcome adjustment for a completed rollout.
const SUCCESS_BONUS: f64 = 50.0;
/// Outcome adjustment for a rollback exit.
const ROLLBACK_PENALTY: f64 = -10.0;

/// Score one step.
///
/// `traffic` is the canary fraction after the step's action was applied.
/// The shaping terms are deliberately asymmetric: increasing into
/// elevated errors costs far more than backing off healthy traffic, so
/// a cautious policy outranks a reckless one long before a rollback.
pub fn score_step(
    snapshot: &MetricSnapshot,
    traffic: f64,
    action: Action,
    thresholds: &Thresholds,
) -> f64 {
    let err = snapshot.error_rate;
    let cluster_err = snapshot.cluster_error_rate;
    let healthy =
        err < thresholds.success_error_local && cluster_err < thresholds.success_error_cluster;

    let mut score = 0.0;

    // Progress pays super-linearly so a policy parked at half traffic
    // scores well below one that finishes the rollout.
    score += traffic.powf(1.5) * 3.0;

    score -= err * 15.0;
    score -= cluster_err * 10.0;

    if snapshot.latency_p95_ms > thresholds.slo_latency_local_ms {
        score -= (snapshot.latency_p95_ms - thresholds.slo_latency_local_ms) * 0.05;
    }
    if snapshot.end_to_end_latency_ms > thresholds.slo_latency_e2e_ms {
        score -= (snapshot.end_to_end_latency_ms - thresholds.slo_latency_e2e_ms) * 0.02;
    }
    if snapshot.cpu_usage > SATURATION {
        score -= (snapshot.cpu_usage - SATURATION) * 5.0;
    }
    if snapshot.memory_usage > SATURATION {
        score -= (snapshot.memory_usage - SATURATION) * 5.0;
    }

    // Action shaping. The terms are independent, not exclusive: a hold
    // at low traffic with elevated errors collects both its credit and
    // its stall penalty.
    if action == Action::Increase && !healthy {
        score -= 5.0;
    }
    if action == Action::Increase && err < ERR_LOW {
        score += 0.5;
    }
    if action == Action::Decrease && err > ERR_ELEVATED && traffic > 0.1 {
        score += 2.0;
    }
    if action == Action::Decrease && err < ERR_LOW {
        score -= 1.5;
    }
    if action == Action::Hold && err > ERR_ELEVATED && traffic > 0.1 {
        score += 0.3;
    }
    if action == Action::Hold && traffic < 0.8 {
        score -= if err < ERR_LOW { 0.5 } else { 0.1 };
    }

    if traffic == 0.0 {
        score -= 0.5;
    }
    if traffic >= 0.8 && healthy {
        score += 1.5;
    }
    if traffic >= 0.9 && healthy {
        score += 2.0;
    }

    score
}

/// Fold a finished session into one scalar.
///
/// Sums the per-step scores over the trace and adds the outcome
/// adjustment: completing a rollout is worth a large fixed bonus, a
/// rollback a fixed penalty, a timeout nothing beyond its steps.
pub fn score_rollout(report: &RolloutReport, thresholds: &Thresholds) -> f64 {
    let steps: f64 = report
        .trace
        .iter()
        .map(|record| score_step(&record.snapshot, record.traffic_after, record.action, thresholds))
        .sum();
    let outcome = match report.status {
        RolloutStatus::Succeeded => SUCCESS_BONUS,
        RolloutStatus::RolledBack { .. } => ROLLBACK_PENALTY,
        RolloutStatus::Running | RolloutStatus::TimedOut => 0.0,
    };
    steps + outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serin_control::StepRecord;

    fn healthy() -> MetricSnapshot {
        MetricSnapshot::safe_default()
    }

    fn elevated() -> MetricSnapshot {
        MetricSnapshot {
            error_rate: 0.03,
            ..MetricSnapshot::safe_default()
        }
    }

    fn th() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn full_healthy_traffic_collects_every_bonus() {
        // progress 3.0, safe increase 0.5, 0.8 bonus 1.5, 0.9 bonus 2.0.
        let score = score_step(&healthy(), 1.0, Action::Increase, &th());
        assert_eq!(score, 7.0);
    }

    #[test]
    fn idle_hold_is_penalized() {
        // Stall penalty 0.5 plus the zero-traffic penalty 0.5.
        let score = score_step(&healthy(), 0.0, Action::Hold, &th());
        assert_eq!(score, -1.0);
    }

    #[test]
    fn elevated_errors_invert_the_action_ranking() {
        let increase = score_step(&elevated(), 0.5, Action::Increase, &th());
        let hold = score_step(&elevated(), 0.5, Action::Hold, &th());
        let decrease = score_step(&elevated(), 0.5, Action::Decrease, &th());
        assert!(decrease > hold, "{decrease} vs {hold}");
        assert!(hold > increase, "{hold} vs {increase}");
        assert!(increase < 0.0, "increasing into errors must cost: {increase}");
    }

    #[test]
    fn healthy_signals_rank_increase_first() {
        let increase = score_step(&healthy(), 0.5, Action::Increase, &th());
        let hold = score_step(&healthy(), 0.5, Action::Hold, &th());
        let decrease = score_step(&healthy(), 0.5, Action::Decrease, &th());
        assert!(increase > hold, "{increase} vs {hold}");
        assert!(hold > decrease, "{hold} vs {decrease}");
    }

    #[test]
    fn cluster_errors_block_the_increase_bonus() {
        let snapshot = MetricSnapshot {
            cluster_error_rate: 0.03,
            ..MetricSnapshot::safe_default()
        };
        let poisoned = score_step(&snapshot, 0.5, Action::Increase, &th());
        let clean = score_step(&healthy(), 0.5, Action::Increase, &th());
        // Local error is zero, so only the cluster signal separates them.
        assert!(poisoned < clean - 4.0, "{poisoned} vs {clean}");
    }

    #[test]
    fn latency_over_slo_costs_proportionally() {
        let slow = MetricSnapshot {
            latency_p95_ms: 300.0,
            ..MetricSnapshot::safe_default()
        };
        let base = score_step(&healthy(), 0.5, Action::Hold, &th());
        let over = score_step(&slow, 0.5, Action::Hold, &th());
        // 100ms over a 200ms SLO at 0.05 per ms.
        assert!((base - over - 5.0).abs() < 1e-9, "{base} vs {over}");
    }

    #[test]
    fn e2e_latency_and_saturation_penalties_apply() {
        let stressed = MetricSnapshot {
            end_to_end_latency_ms: 350.0,
            cpu_usage: 1.0,
            memory_usage: 0.95,
            ..MetricSnapshot::safe_default()
        };
        let base = score_step(&healthy(), 0.5, Action::Hold, &th());
        let over = score_step(&stressed, 0.5, Action::Hold, &th());
        // e2e 100ms over at 0.02, cpu 0.1 over at 5.0, mem 0.05 over at 5.0.
        assert!((base - over - 2.75).abs() < 1e-9, "{base} vs {over}");
    }

    #[test]
    fn hold_at_high_traffic_is_not_a_stall() {
        let over_the_gate = score_step(&healthy(), 0.85, Action::Hold, &th());
        let under_the_gate = score_step(&healthy(), 0.75, Action::Hold, &th());
        // 0.85 collects the 0.8 bonus and skips the stall penalty.
        assert!(over_the_gate > under_the_gate + 1.5);
    }

    fn report_with(status: RolloutStatus) -> RolloutReport {
        let trace = vec![
            StepRecord {
                step: 1,
                action: Action::Increase,
                traffic_after: 0.1,
                snapshot: healthy(),
            },
            StepRecord {
                step: 2,
                action: Action::Increase,
                traffic_after: 0.2,
                snapshot: healthy(),
            },
        ];
        RolloutReport {
            status,
            steps: 2,
            final_traffic: 0.2,
            scenario: None,
            trace,
        }
    }

    #[test]
    fn outcome_adjustments_separate_identical_traces() {
        let th = th();
        let succeeded = score_rollout(&report_with(RolloutStatus::Succeeded), &th);
        let timed_out = score_rollout(&report_with(RolloutStatus::TimedOut), &th);
        let rolled_back = score_rollout(&report_with(
            RolloutStatus::RolledBack {
                reason: "local error rate over threshold".to_string(),
            },
        ), &th);
        assert!((succeeded - timed_out - 50.0).abs() < 1e-9);
        assert!((timed_out - rolled_back - 10.0).abs() < 1e-9);
    }

    #[test]
    fn empty_trace_scores_only_the_outcome() {
        let report = RolloutReport {
            status: RolloutStatus::TimedOut,
            steps: 0,
            final_traffic: 0.0,
            scenario: None,
            trace: Vec::new(),
        };
        assert_eq!(score_rollout(&report, &th()), 0.0);
    }
}
