//! serin-eval: offline scoring and seeded policy comparison.
//!
//! Rollout sessions emit a step trace; this crate folds traces into a
//! scalar score and runs seeded batches of simulated sessions through
//! the real control loop to compare policies. Nothing here feeds back
//! into the online loop: scores rank policies, they never terminate a
//! session.
//!
//! # Components
//!
//! - **`score`**: per-step and per-rollout scoring
//! - **`harness`**: multi-episode evaluation and the comparison table

pub mod harness;
pub mod score;

pub use harness::{EvalConfig, PolicySummary, evaluate_policy, render_table};
pub use score::{score_rollout, score_step};
