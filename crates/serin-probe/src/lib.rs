//! serin-probe: HTTP adapters for the control loop's contracts.
//!
//! [`HttpMetricsSource`] polls the canary-local report (and optionally
//! a cluster-wide one) and folds both into a `MetricSnapshot`;
//! [`HttpTrafficSink`] pushes the desired canary weight to the traffic
//! router. Every exchange is a one-shot request on a fresh connection
//! under a hard timeout, so a dead collaborator costs one step, never
//! the session.

mod client;
pub mod sink;
pub mod source;

pub use sink::HttpTrafficSink;
pub use source::HttpMetricsSource;
