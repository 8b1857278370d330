//! serin-control: the rollout control loop.
//!
//! One [`RolloutController`] drives one canary session from zero
//! traffic to a terminal status. Per step it polls metrics, feeds the
//! observation window, asks the policy for an action, pushes the new
//! traffic weight, and applies the safety checks that the policy itself
//! is never trusted with. Collaborator failures degrade the step;
//! only a bad configuration aborts the session.

pub mod controller;

pub use controller::{ControlError, RolloutController, RolloutReport, StepRecord};
