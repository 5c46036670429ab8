//! Cooperative polling trigger with coalesced pending state.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::{Revision, RevisionSource};

/// Starts a pipeline run for a detected revision.
#[async_trait]
pub trait RunLauncher: Send + Sync {
    /// Runs one pipeline execution for the revision to a terminal state.
    async fn launch(&self, revision: Revision);
}

/// Polls a revision source and launches pipeline runs.
///
/// A single cooperative scheduler loop owns all trigger state: at most one
/// run is in flight, and changes detected while a run is active coalesce
/// into a single pending revision (the latest observation wins), so the
/// queue never grows beyond one entry.
pub struct PollingTrigger {
    source: Arc<dyn RevisionSource>,
    launcher: Arc<dyn RunLauncher>,
    interval: Duration,
    manual: Arc<Notify>,
}

impl PollingTrigger {
    /// Creates a trigger polling `source` on a fixed interval.
    #[must_use]
    pub fn new(
        source: Arc<dyn RevisionSource>,
        launcher: Arc<dyn RunLauncher>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            launcher,
            interval,
            manual: Arc::new(Notify::new()),
        }
    }

    /// Returns a handle that forces an immediate poll, bypassing the
    /// interval. Dispatch policy (one in flight, coalesced pending) still
    /// applies.
    #[must_use]
    pub fn manual_handle(&self) -> Arc<Notify> {
        self.manual.clone()
    }

    /// Runs the trigger loop until `shutdown` fires.
    ///
    /// An in-flight run is not aborted by shutdown; the loop simply stops
    /// scheduling new ones.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        tracing::info!(identity = %self.source.identity(), "source trigger started");

        let mut last_seen: Option<String> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut pending: Option<Revision> = None;

        loop {
            let run_done = async {
                match in_flight.as_mut() {
                    Some(handle) => {
                        if let Err(e) = handle.await {
                            tracing::error!(error = %e, "pipeline run task failed");
                        }
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("source trigger shutting down");
                    break;
                }
                () = run_done => {
                    in_flight = None;
                    if let Some(revision) = pending.take() {
                        in_flight = Some(self.dispatch(revision));
                    }
                }
                () = self.manual.notified() => {
                    self.poll(&mut last_seen, &mut in_flight, &mut pending).await;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.poll(&mut last_seen, &mut in_flight, &mut pending).await;
                }
            }
        }
    }

    /// Checks the source head and dispatches or queues a new revision.
    async fn poll(
        &self,
        last_seen: &mut Option<String>,
        in_flight: &mut Option<JoinHandle<()>>,
        pending: &mut Option<Revision>,
    ) {
        let revision = match self.source.head().await {
            Ok(revision) => revision,
            Err(e) => {
                tracing::warn!(identity = %self.source.identity(), error = %e, "poll failed");
                return;
            }
        };

        if last_seen.as_deref() == Some(revision.id.as_str()) {
            return;
        }
        *last_seen = Some(revision.id.clone());

        if in_flight.is_some() {
            // Coalesce: only the latest detection survives.
            tracing::debug!(revision = %revision.id, "run in flight, queueing revision");
            *pending = Some(revision);
        } else {
            *in_flight = Some(self.dispatch(revision));
        }
    }

    fn dispatch(&self, revision: Revision) -> JoinHandle<()> {
        tracing::info!(revision = %revision.id, "starting pipeline run");
        let launcher = self.launcher.clone();
        tokio::spawn(async move {
            launcher.launch(revision).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RepoIdentity;
    use crate::testing::StaticRevisionSource;
    use parking_lot::Mutex;

    /// Records launched revisions; holds the first run open until released.
    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<String>>,
        hold: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl RecordingLauncher {
        fn holding(release: tokio::sync::oneshot::Receiver<()>) -> Self {
            Self {
                hold: Mutex::new(Some(release)),
                ..Self::default()
            }
        }

        fn launched(&self) -> Vec<String> {
            self.launched.lock().clone()
        }
    }

    #[async_trait]
    impl RunLauncher for RecordingLauncher {
        async fn launch(&self, revision: Revision) {
            self.launched.lock().push(revision.id);
            let receiver = self.hold.lock().take();
            if let Some(receiver) = receiver {
                let _ = receiver.await;
            }
        }
    }

    fn shutdown_pair() -> (watch::Sender<()>, watch::Receiver<()>) {
        watch::channel(())
    }

    #[tokio::test]
    async fn test_new_revision_launches_run() {
        let source = Arc::new(StaticRevisionSource::new("rev-1", b"snap".to_vec()));
        let launcher = Arc::new(RecordingLauncher::default());
        let trigger = PollingTrigger::new(
            source,
            launcher.clone(),
            Duration::from_millis(5),
        );

        let (tx, rx) = shutdown_pair();
        let loop_task = tokio::spawn(async move { trigger.run(rx).await });

        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(()).unwrap();
        loop_task.await.unwrap();

        assert_eq!(launcher.launched(), vec!["rev-1"]);
    }

    #[tokio::test]
    async fn test_unchanged_revision_does_not_relaunch() {
        let source = Arc::new(StaticRevisionSource::new("rev-1", Vec::new()));
        let launcher = Arc::new(RecordingLauncher::default());
        let trigger = PollingTrigger::new(
            source,
            launcher.clone(),
            Duration::from_millis(5),
        );

        let (tx, rx) = shutdown_pair();
        let loop_task = tokio::spawn(async move { trigger.run(rx).await });

        // Several intervals elapse while the head stays the same.
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(()).unwrap();
        loop_task.await.unwrap();

        assert_eq!(launcher.launched(), vec!["rev-1"]);
    }

    #[tokio::test]
    async fn test_detections_during_run_coalesce_to_one() {
        let source = Arc::new(StaticRevisionSource::new("rev-1", Vec::new()));
        let (release, hold) = tokio::sync::oneshot::channel();
        let launcher = Arc::new(RecordingLauncher::holding(hold));
        let trigger = PollingTrigger::new(
            source.clone(),
            launcher.clone(),
            Duration::from_millis(5),
        );

        let (tx, rx) = shutdown_pair();
        let loop_task = tokio::spawn(async move { trigger.run(rx).await });

        // First revision starts a held run; two more land while it runs.
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.set_head("rev-2", Vec::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.set_head("rev-3", Vec::new());
        tokio::time::sleep(Duration::from_millis(20)).await;

        release.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();
        loop_task.await.unwrap();

        // rev-2 was coalesced away; only the latest pending revision ran.
        assert_eq!(launcher.launched(), vec!["rev-1", "rev-3"]);
    }

    #[tokio::test]
    async fn test_manual_handle_bypasses_interval() {
        let source = Arc::new(StaticRevisionSource::new("rev-1", Vec::new()));
        let launcher = Arc::new(RecordingLauncher::default());
        let trigger = PollingTrigger::new(
            source,
            launcher.clone(),
            Duration::from_secs(3600),
        );
        let manual = trigger.manual_handle();

        let (tx, rx) = shutdown_pair();
        let loop_task = tokio::spawn(async move { trigger.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        manual.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();
        loop_task.await.unwrap();

        assert_eq!(launcher.launched(), vec!["rev-1"]);
    }

    #[test]
    fn test_identity_accessible_through_source() {
        let source = StaticRevisionSource::new("rev-1", Vec::new());
        assert_eq!(
            source.identity(),
            &RepoIdentity::new("acme", "webapp", "main")
        );
    }
}
