//! Core vocabulary types shared across the engine.

mod artifact;
mod principal;
mod status;

pub use artifact::{ArtifactLocation, ArtifactName, ArtifactRef};
pub use principal::Principal;
pub use status::{ActionKind, ActionStatus};
