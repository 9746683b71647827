//! The removal engine: classify and settle each delivery, report progress.

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{MatchTarget, RemovalMode, RemoverConfig};
use crate::error::{Result, TransportError};
use crate::queue::Delivery;
use crate::remover::disposition::Disposition;
use crate::remover::matcher::Matcher;
use crate::remover::status::{Status, StatusSender, StatusStream, status_channel};
use crate::remover::subject;

/// Consumes a delivery stream until it closes.
///
/// Runs in one state, `Running`, looping once per delivery, and ends in
/// `Finished` when the upstream stream closes. It never closes the stream
/// itself; bounded scans are stopped by whoever owns the connection.
pub struct RemovalEngine {
    matcher: Matcher,
    target: MatchTarget,
    mode: RemovalMode,
    continuous: bool,
    status: Status,
}

impl RemovalEngine {
    pub fn new(config: &RemoverConfig) -> Self {
        Self {
            matcher: config.pattern.clone(),
            target: config.match_target,
            mode: config.removal_mode,
            continuous: config.continuous,
            status: Status::default(),
        }
    }

    /// Current counters.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Classify and settle one delivery, then bump the counters.
    pub async fn process<D: Delivery>(&mut self, delivery: D) -> Result<Disposition> {
        let matched = {
            let bytes = subject::extract(&delivery, self.target)?;
            self.matcher.matches(&bytes)
        };

        let disposition = Disposition::decide(matched, self.continuous, self.mode);
        disposition.apply(delivery).await?;

        self.status.processed += 1;
        if disposition.is_removal() {
            self.status.removed += 1;
        }
        Ok(disposition)
    }

    /// Drive the engine to completion, pushing a snapshot after every message
    /// and exactly one `finished` snapshot when `deliveries` ends.
    ///
    /// Any failure aborts the run: the error is logged and returned, and no
    /// further snapshots are sent.
    pub async fn run<S, D>(mut self, deliveries: S, status_tx: StatusSender) -> Result<Status>
    where
        S: Stream<Item = std::result::Result<D, TransportError>> + Unpin,
        D: Delivery,
    {
        let result = self.drain(deliveries, &status_tx).await;
        if let Err(ref e) = result {
            error!(
                error = %e,
                processed = self.status.processed,
                removed = self.status.removed,
                "Removal run aborted"
            );
        }
        result
    }

    async fn drain<S, D>(&mut self, mut deliveries: S, status_tx: &StatusSender) -> Result<Status>
    where
        S: Stream<Item = std::result::Result<D, TransportError>> + Unpin,
        D: Delivery,
    {
        while let Some(item) = deliveries.next().await {
            let disposition = self.process(item?).await?;
            debug!(
                disposition = %disposition,
                processed = self.status.processed,
                removed = self.status.removed,
                "Message processed"
            );

            if status_tx.send(self.status).await.is_err() {
                warn!("Status receiver dropped, stopping removal");
                return Ok(self.status);
            }
        }

        self.status.finished = true;
        info!(
            processed = self.status.processed,
            removed = self.status.removed,
            "Delivery stream closed"
        );
        // Receiver may already be gone; the run is over either way.
        let _ = status_tx.send(self.status).await;
        Ok(self.status)
    }

    /// Run on a dedicated task. Returns the status stream and the task handle.
    pub fn spawn<S, D>(self, deliveries: S) -> (StatusStream, JoinHandle<Result<Status>>)
    where
        S: Stream<Item = std::result::Result<D, TransportError>> + Unpin + Send + 'static,
        D: Delivery,
    {
        let (tx, rx) = status_channel();
        let handle = tokio::spawn(self.run(deliveries, tx));
        (rx, handle)
    }
}
