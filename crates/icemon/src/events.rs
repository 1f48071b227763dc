//! Transition events emitted by the connection worker.
//!
//! Events flow over a single-producer/single-consumer channel: the worker
//! pushes, the coordinator drains on its own execution context and dispatches
//! to the on-air controller. Delivery order is emission order.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// A stream state transition.
///
/// Emitted exactly once per state change, never per I/O operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The stream started delivering data.
    Online { timestamp: DateTime<Utc> },
    /// The stream stopped delivering data (connection lost or silence
    /// exceeded the liveness threshold).
    Offline { timestamp: DateTime<Utc> },
}

impl StreamEvent {
    /// An online transition stamped with the current time.
    pub fn online_now() -> Self {
        Self::Online {
            timestamp: Utc::now(),
        }
    }

    /// An offline transition stamped with the current time.
    pub fn offline_now() -> Self {
        Self::Offline {
            timestamp: Utc::now(),
        }
    }

    /// Whether this event marks the stream as online.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }

    /// Human-readable description for logging.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Online { .. } => "stream came online",
            Self::Offline { .. } => "stream went offline",
        }
    }
}

/// Sending half, owned by the connection worker.
pub type EventSender = mpsc::UnboundedSender<StreamEvent>;

/// Receiving half, owned by the coordinator.
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Create the worker-to-coordinator event channel.
///
/// Unbounded is safe here: transitions are rare by construction (one per
/// state change, reconnects are paced), so the queue stays tiny.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_helpers() {
        assert!(StreamEvent::online_now().is_online());
        assert!(!StreamEvent::offline_now().is_online());
        assert_eq!(StreamEvent::online_now().description(), "stream came online");
        assert_eq!(
            StreamEvent::offline_now().description(),
            "stream went offline"
        );
    }

    #[test]
    fn test_channel_preserves_order() {
        let (tx, mut rx) = channel();
        tx.send(StreamEvent::online_now()).unwrap();
        tx.send(StreamEvent::offline_now()).unwrap();

        assert!(rx.try_recv().unwrap().is_online());
        assert!(!rx.try_recv().unwrap().is_online());
        assert!(rx.try_recv().is_err());
    }
}
