//! Contracts the control loop speaks to its collaborators.
//!
//! The loop itself never knows whether it is driving a live cluster or
//! the synthetic one: anything that can produce a `MetricSnapshot` and
//! accept a traffic weight can sit behind these traits. The online
//! adapters live in serin-probe; the simulation twin implements both
//! sides through one handle.

use std::future::Future;

use thiserror::Error;

use crate::types::MetricSnapshot;

/// Errors from a metrics source.
///
/// All of these are transient from the control loop's point of view: a
/// failed poll is logged and replaced by `MetricSnapshot::safe_default()`,
/// never escalated.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("metrics poll failed: {0}")]
    Poll(String),

    #[error("metrics poll timed out after {0}ms")]
    Timeout(u64),

    #[error("metrics endpoint returned status {0}")]
    Status(u16),
}

/// Errors from a traffic sink.
///
/// Also transient: the loop keeps its internal traffic fraction and
/// retries the apply on the next step.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("traffic weight apply failed: {0}")]
    Apply(String),

    #[error("traffic weight apply timed out after {0}ms")]
    Timeout(u64),

    #[error("traffic endpoint returned status {0}")]
    Status(u16),
}

/// Something that can be polled for one step's raw signals.
pub trait MetricsSource: Send {
    /// Fetch the current snapshot.
    fn poll(&mut self) -> impl Future<Output = Result<MetricSnapshot, SourceError>> + Send;

    /// Clear accumulated metrics so traffic routed before this rollout
    /// does not bias the first observation. Called once at session start.
    fn reset(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Something that accepts the canary traffic split.
pub trait TrafficSink: Send {
    /// Route `percent` (0..=100) of traffic to the canary.
    ///
    /// Must be idempotent on the receiver side: applying the same
    /// percent twice leaves the receiver in the same state as applying
    /// it once.
    fn apply_weight(&mut self, percent: u8) -> impl Future<Output = Result<(), SinkError>> + Send;
}
