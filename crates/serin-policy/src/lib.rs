//! serin-policy: decision policies for rollout control.
//!
//! A policy turns one flattened observation window into one traffic
//! action. The control loop owns safety (rollback and success checks);
//! a policy only paces the rollout, so a bad policy wastes steps but
//! cannot ship a breach past the loop's own thresholds.
//!
//! Two implementations are provided: [`RulePolicy`], a fixed chain of
//! threshold and trend rules, and [`ExternalPolicy`], which defers the
//! decision to a caller-supplied function speaking the action wire
//! index.

use serin_core::types::Action;
use thiserror::Error;

pub mod external;
pub mod rule;

pub use external::ExternalPolicy;
pub use rule::{RulePolicy, RulePolicyConfig};

#[derive(Debug, Error)]
pub enum PolicyError {
    /// Observation length is empty or not a whole number of rows.
    #[error("observation of length {len} is not a whole number of {channels}-channel rows")]
    Observation { len: usize, channels: usize },
    /// An external policy produced an index outside the action set.
    #[error("invalid action index {0}, expected 0..=2")]
    InvalidAction(u32),
    /// The external decision function itself failed.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

/// Validate an observation's shape and return its row count.
pub(crate) fn observation_rows(observation: &[f64]) -> Result<usize, PolicyError> {
    let channels = serin_core::NUM_CHANNELS;
    if observation.is_empty() || observation.len() % channels != 0 {
        return Err(PolicyError::Observation {
            len: observation.len(),
            channels,
        });
    }
    Ok(observation.len() / channels)
}

/// A decision policy for the rollout control loop.
///
/// `decide` receives the flattened observation window, oldest row
/// first, and returns the next traffic action. Implementations may keep
/// internal state across calls; one policy instance serves one session.
pub trait Policy: Send {
    /// Short identifier used in logs and evaluation reports.
    fn name(&self) -> &str;

    fn decide(&mut self, observation: &[f64]) -> Result<Action, PolicyError>;
}
