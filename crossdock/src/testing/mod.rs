//! Test support: deterministic fakes for external collaborators.

mod fixtures;

pub use fixtures::{RecordingChangeTarget, StaticRevisionSource, StoreFixture};
