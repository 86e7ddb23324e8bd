//! Best-effort classification-state notifications.
//!
//! Indicator-style consumers (a status LED task, a UI) want to know the
//! latest decoded outcome without being able to stall the coordinator. Each
//! subscriber owns an independent bounded channel; publishing is a
//! non-blocking `try_send` per listener, and a full queue or an absent
//! listener is a logged, non-fatal condition.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Latest decoded classification outcome, fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// The decoded recognition string.
    pub text: String,
    /// Inference-start timestamp of the last iteration in the aggregation,
    /// in seconds.
    pub timestamp: f32,
}

/// Fan-out hub for `DetectionEvent`s.
pub struct NotificationHub {
    listeners: Vec<Sender<DetectionEvent>>,
    queue_depth: usize,
    seq: u64,
}

impl NotificationHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            listeners: Vec::new(),
            queue_depth,
            seq: 0,
        }
    }

    /// Register a consumer. Must be called before the hub moves into the
    /// coordinator.
    pub fn subscribe(&mut self) -> Receiver<DetectionEvent> {
        let (tx, rx) = bounded(self.queue_depth);
        self.listeners.push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Fan the latest outcome out to every listener without blocking.
    pub fn publish(&mut self, text: &str, timestamp: f32) {
        let event = DetectionEvent {
            seq: self.seq,
            text: text.to_owned(),
            timestamp,
        };
        self.seq += 1;

        if self.listeners.is_empty() {
            debug!(seq = event.seq, "no notification listeners registered");
            return;
        }

        self.listeners.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                warn!(seq = ev.seq, "notification queue full; event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("notification listener disconnected; unregistering");
                false
            }
        });
    }
}
