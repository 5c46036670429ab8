//! Cross-account deployment: parameter overrides and the deploy action.

mod action;
mod overrides;

pub use action::{ChangeOutcome, ChangeRejection, ChangeSet, ChangeTarget, DeployAction, DeployOutcome};
#[cfg(test)]
pub use action::MockChangeTarget;
pub use overrides::{OverrideValue, ParameterOverrides};
