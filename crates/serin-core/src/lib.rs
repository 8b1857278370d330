//! serin-core: domain types shared by the progressive-delivery controller.
//!
//! This crate holds everything both halves of Serin agree on: the rollout
//! session state, the raw metrics contract, signal normalization and the
//! sliding observation window, the shared safety thresholds, and the
//! source/sink contracts the control loop speaks to its collaborators.
//! It has no I/O of its own.
//!
//! # Components
//!
//! - **`types`**: rollout state, status, actions, metric snapshots
//! - **`config`**: rollout configuration and shared safety thresholds
//! - **`window`**: normalization and the fixed-capacity observation window
//! - **`contract`**: `MetricsSource` / `TrafficSink` traits and their errors

pub mod config;
pub mod contract;
pub mod types;
pub mod window;

pub use config::{ConfigError, RolloutConfig, Thresholds, parse_duration};
pub use contract::{MetricsSource, SinkError, SourceError, TrafficSink};
pub use types::{Action, MetricSnapshot, RolloutState, RolloutStatus};
pub use window::{NUM_CHANNELS, NormalizedVector, ObservationWindow, normalize};
