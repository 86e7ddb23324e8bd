//! Decoded-result delivery to the external publisher.
//!
//! The coordinator is the sole producer and one delivery task the sole
//! consumer. Sends never block: a full queue drops the message and logs the
//! loss — delivery is best-effort. The delivery task serialises publishes
//! behind a dedicated lock so only one is in flight across the whole
//! process, and releases each message after the attempt whether the publish
//! succeeded or not.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::Result;

/// Owned decoded result moving from the coordinator to the delivery task.
///
/// Ownership transfers through the queue; dropping the message releases the
/// string exactly once, on whichever side last holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub text: String,
}

/// Create the bounded result queue.
pub fn result_channel(depth: usize) -> (ResultSender, Receiver<ResultMessage>) {
    let (tx, rx) = bounded(depth);
    (ResultSender { tx }, rx)
}

/// Producer handle for decoded results.
#[derive(Clone)]
pub struct ResultSender {
    tx: Sender<ResultMessage>,
}

impl ResultSender {
    /// Enqueue without blocking. A full queue or a gone consumer drops the
    /// message; the loss is logged, never an error.
    pub fn send(&self, msg: ResultMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                error!(text = %dropped.text, "result queue full; dropping message");
            }
            Err(TrySendError::Disconnected(dropped)) => {
                error!(text = %dropped.text, "delivery task is gone; dropping message");
            }
        }
    }
}

/// The external publish seam (an MQTT agent in the reference deployment).
pub trait Publisher: Send {
    /// Blocks until acknowledgement or `timeout`.
    fn publish(&mut self, payload: &str, timeout: Duration) -> Result<()>;
}

/// Consumes the result queue and hands each message to the publisher.
pub struct DeliveryTask {
    rx: Receiver<ResultMessage>,
    publisher: Box<dyn Publisher>,
    /// Held across each publish call so only one is in flight process-wide.
    publish_lock: Arc<Mutex<()>>,
    publish_timeout: Duration,
}

impl DeliveryTask {
    pub fn new(
        rx: Receiver<ResultMessage>,
        publisher: Box<dyn Publisher>,
        publish_lock: Arc<Mutex<()>>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            publisher,
            publish_lock,
            publish_timeout,
        }
    }

    /// Run until every producer handle is dropped. Each received message is
    /// released after the publish attempt, success or failure.
    pub fn run(mut self) {
        info!("delivery task started");
        while let Ok(msg) = self.rx.recv() {
            let _in_flight = self.publish_lock.lock();
            match self.publisher.publish(&msg.text, self.publish_timeout) {
                Ok(()) => info!(text = %msg.text, "result published"),
                Err(e) => error!(error = %e, "publish failed; message discarded"),
            }
        }
        info!("result queue closed; delivery task exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crate::error::PipelineError;

    /// Records payloads; fails the publish whose (1-based) index is in
    /// `fail_on`.
    struct ScriptedPublisher {
        seen: Arc<parking_lot::Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
    }

    impl Publisher for ScriptedPublisher {
        fn publish(&mut self, payload: &str, _timeout: Duration) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            self.seen.lock().push(payload.to_owned());
            if self.fail_on.contains(&n) {
                return Err(PipelineError::Publish("broker rejected".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn every_message_is_consumed_once_even_when_a_publish_fails() {
        let (sender, rx) = result_channel(10);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let task = DeliveryTask::new(
            rx,
            Box::new(ScriptedPublisher {
                seen: Arc::clone(&seen),
                calls: Arc::clone(&calls),
                fail_on: vec![2],
            }),
            Arc::new(Mutex::new(())),
            Duration::from_millis(100),
        );
        let worker = thread::spawn(move || task.run());

        for text in ["one", "two", "three"] {
            sender.send(ResultMessage { text: text.into() });
        }
        drop(sender);
        worker.join().expect("delivery task panicked");

        // All three strings passed through exactly once; the failed publish
        // did not stop the loop and its message was still released.
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(&*seen.lock(), &["one", "two", "three"]);
    }

    #[test]
    fn full_queue_drops_newest_message() {
        let (sender, rx) = result_channel(1);
        sender.send(ResultMessage { text: "kept".into() });
        sender.send(ResultMessage { text: "dropped".into() });

        assert_eq!(rx.recv().expect("first message").text, "kept");
        assert!(rx.try_recv().is_err(), "overflow message must be dropped");
    }

    #[test]
    fn publishes_are_serialised_behind_the_shared_lock() {
        let lock = Arc::new(Mutex::new(()));
        let (sender, rx) = result_channel(4);

        struct HoldingPublisher {
            max_concurrent: Arc<AtomicUsize>,
            current: Arc<AtomicUsize>,
        }
        impl Publisher for HoldingPublisher {
            fn publish(&mut self, _payload: &str, _timeout: Duration) -> Result<()> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_concurrent.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        // Two delivery tasks sharing one lock: publishes must never overlap.
        let mut workers = Vec::new();
        for _ in 0..2 {
            let task = DeliveryTask::new(
                rx.clone(),
                Box::new(HoldingPublisher {
                    max_concurrent: Arc::clone(&max_concurrent),
                    current: Arc::clone(&current),
                }),
                Arc::clone(&lock),
                Duration::from_millis(100),
            );
            workers.push(thread::spawn(move || task.run()));
        }

        for i in 0..4 {
            sender.send(ResultMessage {
                text: format!("m{i}"),
            });
        }
        drop(sender);
        drop(rx);
        for w in workers {
            w.join().expect("delivery task panicked");
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
