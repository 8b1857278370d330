//! serin-sim: the deterministic simulation twin of the cluster.
//!
//! Substitutes for the real metrics sources and traffic sink during
//! policy validation. The synthetic cluster consumes the same actions
//! and produces the same metrics contract as a live cluster, so the
//! control loop runs against it unmodified. All randomness flows
//! through one seeded generator: same seed plus same config gives an
//! identical rollout, which is what makes policy regressions testable.
//!
//! # Components
//!
//! - **`scenario`**: the four failure-mode profiles and their weighted draw
//! - **`cluster`**: the synthetic cluster, cascade smoothing, and the
//!   shared handle implementing both control-loop contracts

pub mod cluster;
pub mod scenario;

pub use cluster::{SimConfig, SimHandle, SyntheticCluster};
pub use scenario::Scenario;
