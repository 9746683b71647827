//! Selective message removal.
//!
//! Deliveries flow one way: broker → [`RemovalEngine`] → [`StatusStream`] →
//! observer. The observer controls the run only by ending it through
//! [`RemovalRun::shutdown`], which closes the delivery stream.

pub mod disposition;
pub mod engine;
pub mod matcher;
pub mod status;
pub mod subject;

pub use disposition::Disposition;
pub use engine::RemovalEngine;
pub use matcher::Matcher;
pub use status::{STATUS_CAPACITY, Status, StatusStream};

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RemoverConfig;
use crate::error::{Error, Result};
use crate::queue::QueueClient;

/// Start consuming `config.queue_name` and spawn the removal worker.
///
/// Consumer setup failures are returned before the worker starts.
pub async fn remove_messages<C: QueueClient>(
    client: C,
    config: &RemoverConfig,
) -> Result<RemovalRun<C>> {
    let deliveries = client
        .consume(&config.queue_name, config.prefetch)
        .await?;

    info!(
        queue = %config.queue_name,
        pattern = %config.pattern.as_str(),
        prefetch = config.prefetch,
        target = ?config.match_target,
        mode = ?config.removal_mode,
        continuous = config.continuous,
        "Removing messages"
    );

    // The stream ends either when the broker closes it or when the run is shut down.
    let (close_tx, close_rx) = oneshot::channel::<()>();
    let deliveries = deliveries.take_until(close_rx);

    let (status, worker) = RemovalEngine::new(config).spawn(deliveries);
    Ok(RemovalRun {
        client,
        status,
        worker,
        close_tx: Some(close_tx),
    })
}

/// Handle to a running removal: the status stream plus the means to end it.
pub struct RemovalRun<C: QueueClient> {
    client: C,
    status: StatusStream,
    worker: JoinHandle<Result<Status>>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl<C: QueueClient> RemovalRun<C> {
    /// Snapshots from the worker, one per processed message.
    pub fn status(&mut self) -> &mut StatusStream {
        &mut self.status
    }

    /// End the run and tear down the connection.
    ///
    /// Closes the delivery stream, lets the worker finish the message it is
    /// on, drains the remaining snapshots, then closes the broker connection.
    /// Returns the worker's last counters, or the error that aborted it.
    pub async fn shutdown(mut self) -> Result<Status> {
        if let Some(tx) = self.close_tx.take() {
            // Err only means the worker already stopped.
            let _ = tx.send(());
        }

        let mut drained = 0usize;
        while self.status.next().await.is_some() {
            drained += 1;
        }
        debug!(drained, "Status stream drained");

        let outcome = match self.worker.await {
            Ok(result) => result,
            Err(e) => Err(Error::from(e)),
        };

        if let Err(e) = self.client.close().await {
            warn!(error = %e, "Failed to close broker connection");
            if outcome.is_ok() {
                return Err(e.into());
            }
        }

        outcome
    }
}
