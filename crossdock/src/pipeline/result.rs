//! Execution reports for the external observability surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ActionKind, ActionStatus, ArtifactName};
use crate::errors::ErrorKind;

/// Terminal report for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    /// The action name.
    pub name: String,
    /// The kind of work the action performed.
    pub kind: ActionKind,
    /// Terminal status.
    pub status: ActionStatus,
    /// Failure classification and message, present iff the action failed.
    pub error: Option<FailureDetail>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Artifacts the action published.
    pub outputs: Vec<ArtifactName>,
}

impl ActionReport {
    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    /// The failure class.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// Terminal report for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage name.
    pub name: String,
    /// True iff every action in the stage succeeded.
    pub succeeded: bool,
    /// Action reports in declaration order.
    pub actions: Vec<ActionReport>,
}

impl StageReport {
    /// Returns the first failing action in declaration order, if any.
    #[must_use]
    pub fn first_failed_action(&self) -> Option<&ActionReport> {
        self.actions.iter().find(|a| !a.is_success())
    }
}

/// Names the first failure of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    /// The failing stage.
    pub stage: String,
    /// The first failing action in that stage, by declaration order.
    pub action: String,
    /// The failure class.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// Terminal report for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The run id.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// True iff every stage succeeded.
    pub success: bool,
    /// Reports for the stages that ran, in order. Stages after the failing
    /// one never start and have no report.
    pub stages: Vec<StageReport>,
    /// The first failure, if the run failed.
    pub first_failure: Option<FailureSummary>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Returns the report for a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: ActionStatus) -> ActionReport {
        ActionReport {
            name: name.to_string(),
            kind: ActionKind::Build,
            status,
            error: match status {
                ActionStatus::Failed => Some(FailureDetail {
                    kind: ErrorKind::BuildFailed,
                    message: "exit 1".to_string(),
                }),
                _ => None,
            },
            duration_ms: 10,
            outputs: Vec::new(),
        }
    }

    #[test]
    fn test_first_failed_action_uses_declaration_order() {
        let stage = StageReport {
            name: "build".to_string(),
            succeeded: false,
            actions: vec![
                report("build-webapp", ActionStatus::Succeeded),
                report("build-api", ActionStatus::Failed),
                report("build-worker", ActionStatus::Failed),
            ],
        };

        assert_eq!(stage.first_failed_action().unwrap().name, "build-api");
    }

    #[test]
    fn test_execution_result_serde_round_trip() {
        let result = ExecutionResult {
            run_id: Uuid::new_v4(),
            pipeline: "webapp-delivery".to_string(),
            success: false,
            stages: vec![StageReport {
                name: "build".to_string(),
                succeeded: false,
                actions: vec![report("build-api", ActionStatus::Failed)],
            }],
            first_failure: Some(FailureSummary {
                stage: "build".to_string(),
                action: "build-api".to_string(),
                kind: ErrorKind::BuildFailed,
                message: "exit 1".to_string(),
            }),
            started_at: Utc::now(),
            duration_ms: 42,
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back.pipeline, "webapp-delivery");
        assert_eq!(back.first_failure.unwrap().kind, ErrorKind::BuildFailed);
    }
}
