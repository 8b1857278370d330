//! serin-metrics: the canary-side metrics agent.
//!
//! Runs next to (or inside) the canary process: request outcomes are
//! recorded into a shared [`MetricsAccumulator`], and a small HTTP
//! surface exposes the aggregated report for the controller's probe to
//! poll. Counters accumulate between polls; the probe resets them at
//! session start so every rollout observes a fresh window.

pub mod accumulator;
pub mod exposition;

pub use accumulator::{MetricsAccumulator, MetricsReport};
pub use exposition::build_router;
