//! External policy adapter.
//!
//! Wraps a caller-supplied decision function behind the [`Policy`]
//! trait. The function speaks the action wire index (0=hold,
//! 1=increase, 2=decrease), which is also the convention for learned
//! policies served out of process.

use serin_core::types::Action;
use tracing::trace;

use crate::{Policy, PolicyError, observation_rows};

/// Decision function: observation in, action index out.
pub type DecisionFn = Box<dyn FnMut(&[f64]) -> anyhow::Result<u32> + Send>;

pub struct ExternalPolicy {
    name: String,
    decide: DecisionFn,
}

impl ExternalPolicy {
    pub fn new(name: impl Into<String>, decide: DecisionFn) -> Self {
        Self {
            name: name.into(),
            decide,
        }
    }
}

impl Policy for ExternalPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, observation: &[f64]) -> Result<Action, PolicyError> {
        observation_rows(observation)?;
        let index = (self.decide)(observation)?;
        let action = Action::from_index(index).ok_or(PolicyError::InvalidAction(index))?;
        trace!(policy = %self.name, index, action = action.as_str(), "external decision");
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Vec<f64> {
        vec![0.0; serin_core::NUM_CHANNELS * 3]
    }

    #[test]
    fn maps_wire_index_to_action() {
        let mut policy = ExternalPolicy::new("static", Box::new(|_| Ok(1)));
        assert_eq!(policy.decide(&observation()).unwrap(), Action::Increase);
        assert_eq!(policy.name(), "static");
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut policy = ExternalPolicy::new("bad", Box::new(|_| Ok(7)));
        let err = policy.decide(&observation()).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidAction(7)));
    }

    #[test]
    fn propagates_decision_failure() {
        let mut policy =
            ExternalPolicy::new("flaky", Box::new(|_| anyhow::bail!("upstream unavailable")));
        let err = policy.decide(&observation()).unwrap_err();
        assert!(matches!(err, PolicyError::External(_)));
    }

    #[test]
    fn validates_observation_shape_before_calling_out() {
        let mut policy = ExternalPolicy::new(
            "unreachable",
            Box::new(|_| panic!("decision function called with malformed observation")),
        );
        let err = policy.decide(&[0.0; 5]).unwrap_err();
        assert!(matches!(err, PolicyError::Observation { .. }));
    }

    #[test]
    fn sees_the_full_observation() {
        let mut policy = ExternalPolicy::new(
            "len-echo",
            Box::new(|obs| Ok(u32::from(obs.len() == serin_core::NUM_CHANNELS * 3))),
        );
        assert_eq!(policy.decide(&observation()).unwrap(), Action::Increase);
    }
}
