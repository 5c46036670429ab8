//! Stage graph execution with sequential barriers.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::result::{ActionReport, ExecutionResult, FailureDetail, FailureSummary, StageReport};
use super::spec::{Pipeline, StageSpec};
use crate::actions::{ActionContext, ActionOutcome};
use crate::core::ActionStatus;
use crate::errors::ErrorKind;
use crate::events::{EventSink, NoOpEventSink};

/// Executes pipelines stage by stage.
///
/// Stages run strictly in declared order; actions inside a stage run
/// concurrently and the controller waits for every one of them to reach a
/// terminal state before judging the stage. A failing action never aborts
/// its already-started siblings; it only withholds the next stage.
pub struct Controller {
    events: Arc<dyn EventSink>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// Creates a controller that discards events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a controller emitting through the given sink.
    #[must_use]
    pub fn with_events(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Runs the pipeline to a terminal result.
    ///
    /// Re-running the same pipeline against a clean store reproduces the
    /// same stage and action ordering; all ordering comes from the declared
    /// `Vec`s, never from completion order.
    pub async fn run(&self, pipeline: &Pipeline) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        tracing::info!(pipeline = pipeline.name(), %run_id, "pipeline run started");
        self.events.try_emit(
            "pipeline.started",
            Some(serde_json::json!({
                "pipeline": pipeline.name(),
                "run_id": run_id,
            })),
        );

        let mut stages = Vec::with_capacity(pipeline.stage_count());
        let mut first_failure = None;

        for stage in pipeline.stages() {
            self.events.try_emit(
                "stage.started",
                Some(serde_json::json!({"stage": stage.name})),
            );

            let report = self.run_stage(pipeline, run_id, stage).await;

            if report.succeeded {
                self.events.try_emit(
                    "stage.completed",
                    Some(serde_json::json!({"stage": stage.name})),
                );
                stages.push(report);
            } else {
                // First failing action by declaration order, not by
                // completion order.
                if let Some(action) = report.first_failed_action() {
                    let detail = action.error.clone().unwrap_or(FailureDetail {
                        kind: ErrorKind::Internal,
                        message: "action failed without detail".to_string(),
                    });
                    first_failure = Some(FailureSummary {
                        stage: report.name.clone(),
                        action: action.name.clone(),
                        kind: detail.kind,
                        message: detail.message,
                    });
                }
                self.events.try_emit(
                    "stage.failed",
                    Some(serde_json::json!({"stage": stage.name})),
                );
                stages.push(report);
                break;
            }
        }

        let success = first_failure.is_none();
        let event = if success {
            "pipeline.completed"
        } else {
            "pipeline.failed"
        };
        self.events.try_emit(
            event,
            Some(serde_json::json!({
                "pipeline": pipeline.name(),
                "run_id": run_id,
            })),
        );
        tracing::info!(
            pipeline = pipeline.name(),
            %run_id,
            success,
            "pipeline run finished"
        );

        ExecutionResult {
            run_id,
            pipeline: pipeline.name().to_string(),
            success,
            stages,
            first_failure,
            started_at,
            duration_ms: duration_ms(start),
        }
    }

    /// Runs one stage: all actions concurrently, barrier on full
    /// termination.
    async fn run_stage(&self, pipeline: &Pipeline, run_id: Uuid, stage: &StageSpec) -> StageReport {
        let mut tasks = FuturesUnordered::new();

        for (index, action) in stage.actions.iter().enumerate() {
            let ctx = ActionContext {
                run_id,
                stage: stage.name.clone(),
                store: pipeline.store().clone(),
                events: self.events.clone(),
            };
            let runner = action.runner.clone();
            let name = action.name.clone();

            tasks.push(tokio::spawn(async move {
                ctx.events.try_emit(
                    "action.started",
                    Some(serde_json::json!({"stage": ctx.stage, "action": name})),
                );
                let action_start = Instant::now();
                let outcome = runner.execute(&ctx).await;
                let elapsed_ms = duration_ms(action_start);

                let event = if outcome.is_success() {
                    "action.succeeded"
                } else {
                    "action.failed"
                };
                ctx.events.try_emit(
                    event,
                    Some(serde_json::json!({
                        "stage": ctx.stage,
                        "action": name,
                        "duration_ms": elapsed_ms,
                    })),
                );

                (index, outcome, elapsed_ms)
            }));
        }

        // Barrier: every action reaches a terminal state before the stage
        // is judged, and nothing here aborts a sibling.
        let mut slots: Vec<Option<(ActionOutcome, u64)>> = vec![None; stage.actions.len()];
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok((index, outcome, elapsed_ms)) => {
                    slots[index] = Some((outcome, elapsed_ms));
                }
                Err(e) => {
                    tracing::error!(stage = stage.name, error = %e, "action task panicked");
                }
            }
        }

        let actions: Vec<ActionReport> = stage
            .actions
            .iter()
            .zip(slots)
            .map(|(spec, slot)| {
                let (outcome, elapsed_ms) = slot.unwrap_or_else(|| {
                    (
                        ActionOutcome::failed(ErrorKind::Internal, "action task aborted"),
                        0,
                    )
                });
                ActionReport {
                    name: spec.name.clone(),
                    kind: spec.kind,
                    status: outcome.status,
                    error: outcome
                        .error
                        .map(|(kind, message)| FailureDetail { kind, message }),
                    duration_ms: elapsed_ms,
                    outputs: outcome.outputs.into_iter().map(|a| a.name).collect(),
                }
            })
            .collect();

        let succeeded = actions
            .iter()
            .all(|report| report.status == ActionStatus::Succeeded);

        StageReport {
            name: stage.name.clone(),
            succeeded,
            actions,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, NoOpAction};
    use crate::core::ActionKind;
    use crate::events::CollectingEventSink;
    use crate::keys::KeyRing;
    use crate::pipeline::spec::{ActionSpec, StageSpec};
    use crate::pipeline::PipelineBuilder;
    use crate::store::ArtifactStore;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct FailingAction {
        name: String,
    }

    #[async_trait]
    impl Action for FailingAction {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ActionKind {
            ActionKind::Build
        }

        async fn execute(&self, _ctx: &ActionContext) -> ActionOutcome {
            ActionOutcome::failed(ErrorKind::BuildFailed, "exit 1")
        }
    }

    fn store() -> Arc<ArtifactStore> {
        Arc::new(ArtifactStore::new("pipeline-bucket", Arc::new(KeyRing::new())))
    }

    fn noop(name: &str) -> Arc<dyn Action> {
        Arc::new(NoOpAction::new(name, ActionKind::Build))
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let pipeline = PipelineBuilder::new("delivery", store())
            .stage(StageSpec::new("one").with_action(ActionSpec::new(noop("a"))))
            .unwrap()
            .stage(StageSpec::new("two").with_action(ActionSpec::new(noop("b"))))
            .unwrap()
            .build()
            .unwrap();

        let result = Controller::new().run(&pipeline).await;

        assert!(result.success);
        assert_eq!(result.stages.len(), 2);
        assert!(result.first_failure.is_none());
    }

    #[tokio::test]
    async fn test_failure_halts_progression() {
        let pipeline = PipelineBuilder::new("delivery", store())
            .stage(StageSpec::new("one").with_action(ActionSpec::new(Arc::new(FailingAction {
                name: "broken".to_string(),
            }))))
            .unwrap()
            .stage(StageSpec::new("two").with_action(ActionSpec::new(noop("never-runs"))))
            .unwrap()
            .build()
            .unwrap();

        let result = Controller::new().run(&pipeline).await;

        assert!(!result.success);
        // Stage two never started, so it has no report.
        assert_eq!(result.stages.len(), 1);

        let failure = result.first_failure.unwrap();
        assert_eq!(failure.stage, "one");
        assert_eq!(failure.action, "broken");
        assert_eq!(failure.kind, ErrorKind::BuildFailed);
    }

    #[tokio::test]
    async fn test_first_failure_uses_declaration_order() {
        let pipeline = PipelineBuilder::new("delivery", store())
            .stage(
                StageSpec::new("build")
                    .with_action(ActionSpec::new(Arc::new(FailingAction {
                        name: "first-broken".to_string(),
                    })))
                    .with_action(ActionSpec::new(Arc::new(FailingAction {
                        name: "second-broken".to_string(),
                    }))),
            )
            .unwrap()
            .build()
            .unwrap();

        let result = Controller::new().run(&pipeline).await;
        assert_eq!(result.first_failure.unwrap().action, "first-broken");
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("delivery", store())
            .stage(StageSpec::new("one").with_action(ActionSpec::new(noop("a"))))
            .unwrap()
            .stage(StageSpec::new("two").with_action(ActionSpec::new(noop("b"))))
            .unwrap()
            .build()
            .unwrap();

        Controller::with_events(sink.clone()).run(&pipeline).await;

        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some("pipeline.started"));
        assert_eq!(types.last().map(String::as_str), Some("pipeline.completed"));

        // Stage one is fully terminal before stage two starts.
        let one_done = types.iter().position(|t| t == "stage.completed").unwrap();
        let two_started = types
            .iter()
            .enumerate()
            .filter(|(_, t)| *t == "stage.started")
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        assert!(one_done < two_started);
    }

    #[tokio::test]
    async fn test_rerun_reproduces_ordering() {
        let build = |store: Arc<ArtifactStore>| {
            PipelineBuilder::new("delivery", store)
                .stage(
                    StageSpec::new("build")
                        .with_action(ActionSpec::new(noop("build-webapp")))
                        .with_action(ActionSpec::new(noop("build-api"))),
                )
                .unwrap()
                .stage(StageSpec::new("deploy").with_action(ActionSpec::new(noop("apply"))))
                .unwrap()
                .build()
                .unwrap()
        };

        let first = Controller::new().run(&build(store())).await;
        let second = Controller::new().run(&build(store())).await;

        let names = |r: &ExecutionResult| {
            r.stages
                .iter()
                .flat_map(|s| s.actions.iter().map(|a| a.name.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
    }
}
