//! Progress snapshots streamed from the worker to the observer.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Snapshots buffered between worker and observer. Small on purpose: a
/// stalled observer holds the worker back instead of growing a backlog.
pub const STATUS_CAPACITY: usize = 2;

/// Counters after one processed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// Messages classified so far.
    pub processed: u64,
    /// Messages matched and removed so far. Never exceeds `processed`.
    pub removed: u64,
    /// Set only on the last snapshot of a run.
    pub finished: bool,
}

/// Receiving half of the status channel.
pub type StatusStream = ReceiverStream<Status>;

/// Sending half of the status channel, owned by the worker.
pub type StatusSender = mpsc::Sender<Status>;

/// Create the single-producer, single-consumer status channel.
pub fn status_channel() -> (StatusSender, StatusStream) {
    let (tx, rx) = mpsc::channel(STATUS_CAPACITY);
    (tx, ReceiverStream::new(rx))
}
