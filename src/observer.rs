//! Observer side of a run: progress reporting and the stop decision.

use std::future::Future;

use futures::StreamExt;
use tracing::{debug, info};

use crate::config::RemoverConfig;
use crate::remover::{Status, StatusStream};

/// When the observer ends a run on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop once `limit` messages have been processed.
    Bounded { limit: u64 },
    /// Never stop on a count; run until interrupted or the stream closes.
    Continuous,
}

impl StopPolicy {
    /// Bounded by prefetch unless the run is continuous.
    pub fn for_config(config: &RemoverConfig) -> Self {
        if config.continuous {
            Self::Continuous
        } else {
            Self::Bounded {
                limit: u64::from(config.prefetch),
            }
        }
    }

    pub fn should_stop(&self, status: &Status) -> bool {
        match self {
            Self::Bounded { limit } => status.processed >= *limit,
            Self::Continuous => false,
        }
    }

    /// Number shown as progress: processed for a scan, removed when draining.
    pub fn progress_value(&self, status: &Status) -> u64 {
        match self {
            Self::Bounded { .. } => status.processed,
            Self::Continuous => status.removed,
        }
    }
}

/// Why observation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The worker reported its terminal snapshot.
    Finished,
    /// The bounded limit was reached.
    LimitReached,
    /// The interrupt future resolved.
    Interrupted,
    /// The status stream closed without a terminal snapshot (worker aborted).
    WorkerExited,
}

/// Where progress goes. The binary renders a bar; tests record values.
pub trait ProgressSink {
    fn update(&mut self, value: u64, status: &Status);

    fn finish(&mut self) {}
}

/// Result of [`Observer::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub reason: StopReason,
    /// Last snapshot received, if any.
    pub last: Option<Status>,
}

/// Reads snapshots, reports progress, and decides when to stop.
pub struct Observer<P> {
    policy: StopPolicy,
    progress: P,
}

impl<P: ProgressSink> Observer<P> {
    pub fn new(policy: StopPolicy, progress: P) -> Self {
        Self { policy, progress }
    }

    pub fn into_progress(self) -> P {
        self.progress
    }

    /// Consume snapshots until the run finishes, the stop policy fires, or
    /// `interrupt` resolves. Never touches the worker directly.
    pub async fn observe<F>(&mut self, status: &mut StatusStream, interrupt: F) -> Observation
    where
        F: Future,
    {
        tokio::pin!(interrupt);
        let mut last = None;

        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    info!("Interrupted, stopping");
                    break StopReason::Interrupted;
                }
                next = status.next() => {
                    let Some(snapshot) = next else {
                        debug!("Status stream closed before finishing");
                        break StopReason::WorkerExited;
                    };
                    last = Some(snapshot);
                    self.progress
                        .update(self.policy.progress_value(&snapshot), &snapshot);

                    if snapshot.finished {
                        break StopReason::Finished;
                    }
                    if self.policy.should_stop(&snapshot) {
                        debug!(processed = snapshot.processed, "Limit reached");
                        break StopReason::LimitReached;
                    }
                }
            }
        };

        self.progress.finish();
        Observation { reason, last }
    }
}
