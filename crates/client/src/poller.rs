//! Interval polling of one job until its artifact arrives.
//!
//! Every tick fires a request on its own task, whether or not earlier
//! requests have answered. Responses are funnelled through a channel and
//! merged one at a time, in whatever order they land. The reconciler makes
//! that order irrelevant. Once a merge yields an artifact the interval is
//! dropped, so no further requests go out; responses still in flight are
//! discarded.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagewatch_core::{reconcile, Snapshot, Timeline};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::error::{ClientError, PollError};
use crate::StatusSource;

/// Client-side polling knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay between poll requests.
    pub interval_ms: u64,
    /// Transient failures in a row tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// Upper bound on a single request.
    pub request_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval_ms: 3000,
            max_consecutive_failures: 3,
            request_timeout_ms: 10_000,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// How a finished poll loop went.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The final timeline. Its artifact is always present.
    pub timeline: Timeline,
    /// Requests issued, including any still in flight when the loop stopped.
    pub requests_sent: u64,
    /// Responses merged into the timeline.
    pub responses_merged: u64,
}

/// Polls one [`StatusSource`] on a fixed interval.
pub struct Poller<S> {
    source: Arc<S>,
    config: PollerConfig,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        Poller {
            source: Arc::new(source),
            config,
        }
    }

    pub fn from_arc(source: Arc<S>, config: PollerConfig) -> Self {
        Poller { source, config }
    }

    /// Poll `project_id` until an artifact arrives.
    pub async fn run(&self, project_id: &str) -> Result<PollOutcome, PollError> {
        self.run_with(project_id, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_change` after every merge that
    /// altered the timeline.
    pub async fn run_with<F>(&self, project_id: &str, mut on_change: F) -> Result<PollOutcome, PollError>
    where
        F: FnMut(&Timeline),
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Snapshot, ClientError>>();
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut timeline = Timeline::new();
        let mut failures = 0u32;
        let mut requests_sent = 0u64;
        let mut responses_merged = 0u64;

        tracing::debug!(
            project_id,
            interval_ms = self.config.interval_ms,
            "polling started"
        );

        loop {
            // Merge before ticking, so a ready artifact stops the loop
            // before another request goes out.
            tokio::select! {
                biased;

                Some(result) = rx.recv() => {
                    match result {
                        Ok(snapshot) => {
                            failures = 0;
                            responses_merged += 1;
                            let next = reconcile(&timeline, &snapshot);
                            if next != timeline {
                                on_change(&next);
                            }
                            timeline = next;
                            if timeline.is_complete() {
                                break;
                            }
                        }
                        Err(err) if !err.is_transient() => {
                            tracing::error!(project_id, error = %err, "poll rejected, stopping");
                            return Err(PollError::Rejected {
                                project_id: project_id.to_string(),
                                source: err,
                            });
                        }
                        Err(err) => {
                            failures += 1;
                            tracing::warn!(
                                project_id,
                                failures,
                                error = %err,
                                "poll failed, retrying on next tick"
                            );
                            if failures >= self.config.max_consecutive_failures {
                                return Err(PollError::GaveUp {
                                    project_id: project_id.to_string(),
                                    failures,
                                    last: err,
                                });
                            }
                        }
                    }
                }
                _ = ticker.tick() => {
                    requests_sent += 1;
                    let source = Arc::clone(&self.source);
                    let tx = tx.clone();
                    let id = project_id.to_string();
                    tokio::spawn(async move {
                        let result = source.fetch(&id).await;
                        // The receiver is gone once polling has finished.
                        let _ = tx.send(result);
                    });
                }
            }
        }

        tracing::info!(
            project_id,
            requests_sent,
            responses_merged,
            "artifact received, polling stopped"
        );
        Ok(PollOutcome {
            timeline,
            requests_sent,
            responses_merged,
        })
    }
}
