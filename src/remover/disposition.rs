//! Disposition policy: what to do with a classified message.

use std::fmt;

use crate::config::RemovalMode;
use crate::error::TransportError;
use crate::queue::Delivery;

/// Outcome for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Matched: take it off the queue using the configured removal mode.
    Remove(RemovalMode),
    /// Not matched in continuous mode: hand it back to the queue.
    Return,
    /// Not matched in a bounded scan: do nothing. The delivery stays
    /// unacknowledged until the connection closes.
    Leave,
}

impl Disposition {
    /// Decide from the match result and run mode.
    pub fn decide(matched: bool, continuous: bool, mode: RemovalMode) -> Self {
        match (matched, continuous) {
            (true, _) => Self::Remove(mode),
            (false, true) => Self::Return,
            (false, false) => Self::Leave,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Remove(RemovalMode::Ack) => "remove_ack",
            Self::Remove(RemovalMode::Nack) => "remove_nack",
            Self::Return => "return",
            Self::Leave => "leave",
        }
    }

    /// Settle `delivery` accordingly. Consumes it, so each delivery is
    /// settled at most once; `Leave` just drops it.
    pub async fn apply<D: Delivery>(self, delivery: D) -> Result<(), TransportError> {
        match self {
            Self::Remove(RemovalMode::Ack) => delivery.ack().await,
            Self::Remove(RemovalMode::Nack) => delivery.reject(false).await,
            Self::Return => delivery.reject(true).await,
            Self::Leave => Ok(()),
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_always_removes() {
        for continuous in [false, true] {
            assert_eq!(
                Disposition::decide(true, continuous, RemovalMode::Ack),
                Disposition::Remove(RemovalMode::Ack)
            );
            assert_eq!(
                Disposition::decide(true, continuous, RemovalMode::Nack),
                Disposition::Remove(RemovalMode::Nack)
            );
        }
    }

    #[test]
    fn unmatched_continuous_returns() {
        assert_eq!(
            Disposition::decide(false, true, RemovalMode::Ack),
            Disposition::Return
        );
    }

    #[test]
    fn unmatched_bounded_leaves() {
        let d = Disposition::decide(false, false, RemovalMode::Nack);
        assert_eq!(d, Disposition::Leave);
        assert!(!d.is_removal());
        assert_eq!(d.to_string(), "leave");
    }
}
