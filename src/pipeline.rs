//! Pipeline assembly and lifecycle.
//!
//! `Pipeline::spawn` wires the three tasks together and owns their join
//! handles:
//!
//! ```text
//! AudioSource ─► capture task ─► double buffer ─► inference task
//!                     ▲                                │
//!               control queue                   result queue
//!                                                      ▼
//!                                               delivery task ─► Publisher
//! ```
//!
//! `shutdown` tears the tasks down in dependency order: the shared running
//! flag stops the inference task, closing the control queue stops capture,
//! and the result queue closing behind the inference task drains delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::info;

use crate::audio::AudioSource;
use crate::buffering::DoubleBuffer;
use crate::capture::scheduler::WindowScheduler;
use crate::capture::{control_channel, AudioDriver, CaptureControl, CaptureController};
use crate::config::PipelineConfig;
use crate::coordinator::{self, CoordinatorContext, CoordinatorDiagnostics, CoordinatorSnapshot};
use crate::delivery::{result_channel, DeliveryTask, Publisher};
use crate::error::{PipelineError, Result};
use crate::events::SystemEvents;
use crate::inference::{InferenceBackend, OutputDecoder};
use crate::notify::NotificationHub;
use crate::sync::SharedTimestamp;

/// The caller-supplied seams of a pipeline.
pub struct PipelineParts {
    pub source: AudioSource,
    pub driver: Box<dyn AudioDriver>,
    pub backend: Box<dyn InferenceBackend>,
    pub decoder: Box<dyn OutputDecoder>,
    pub publisher: Box<dyn Publisher>,
    pub hub: NotificationHub,
}

/// A running pipeline: three spawned tasks plus the handles that control
/// them.
pub struct Pipeline {
    capture: CaptureControl,
    events: Arc<SystemEvents>,
    running: Arc<AtomicBool>,
    diagnostics: Arc<CoordinatorDiagnostics>,
    capture_task: JoinHandle<()>,
    inference_task: JoinHandle<Result<()>>,
    delivery_task: JoinHandle<()>,
}

impl Pipeline {
    /// Wire up and spawn the capture, inference and delivery tasks. The
    /// pipeline comes up idle; call `start` to begin processing.
    pub fn spawn(config: PipelineConfig, parts: PipelineParts) -> Result<Self> {
        let (capture_handle, control_rx) = control_channel(config.control_queue_depth);
        let (capture_side, inference_side) = DoubleBuffer::new(config.window_samples).split();
        let (result_tx, result_rx) = result_channel(config.result_queue_depth);

        let timestamp = Arc::new(SharedTimestamp::new());
        let events = Arc::new(SystemEvents::new());
        let running = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(CoordinatorDiagnostics::default());

        let scheduler = WindowScheduler::new(
            config.window_samples,
            config.sample_rate,
            Arc::clone(&timestamp),
        );
        let mut controller = CaptureController::new(
            parts.source,
            capture_side,
            control_rx,
            parts.driver,
            Box::new(scheduler),
        );
        let capture_task = thread::Builder::new()
            .name("capture".into())
            .spawn(move || controller.run())?;

        let ctx = CoordinatorContext {
            inference: inference_side,
            events: Arc::clone(&events),
            backend: parts.backend,
            decoder: parts.decoder,
            delivery: result_tx,
            hub: parts.hub,
            timestamp,
            running: Arc::clone(&running),
            aggregate_count: config.aggregate_count,
            iteration_delay: config.iteration_delay,
            diagnostics: Arc::clone(&diagnostics),
        };
        let inference_task = thread::Builder::new()
            .name("inference".into())
            .spawn(move || coordinator::run(ctx))?;

        let delivery = DeliveryTask::new(
            result_rx,
            parts.publisher,
            Arc::new(Mutex::new(())),
            config.publish_timeout,
        );
        let delivery_task = thread::Builder::new()
            .name("delivery".into())
            .spawn(move || delivery.run())?;

        info!("pipeline spawned");
        Ok(Self {
            capture: capture_handle,
            events,
            running,
            diagnostics,
            capture_task,
            inference_task,
            delivery_task,
        })
    }

    /// Begin capturing and inferring.
    ///
    /// Deployments that publish over a network usually gate this on the
    /// service bring-up flags, e.g.
    /// `pipeline.events().wait_service_connected()` before the first start.
    pub fn start(&self) {
        self.capture.start();
        self.events.request_inference_start();
    }

    /// Stop capturing and inferring. The pipeline stays armed; `start`
    /// resumes it without reinitialising hardware or the model.
    pub fn stop(&self) {
        self.capture.stop();
        self.events.request_inference_stop();
    }

    /// Handle for direct capture control requests.
    pub fn capture_control(&self) -> CaptureControl {
        self.capture.clone()
    }

    /// The shared condition flags, for service bring-up signalling.
    pub fn events(&self) -> Arc<SystemEvents> {
        Arc::clone(&self.events)
    }

    pub fn diagnostics(&self) -> CoordinatorSnapshot {
        self.diagnostics.snapshot()
    }

    /// Tear the tasks down and wait for all three to exit. Returns the
    /// inference task's outcome.
    pub fn shutdown(self) -> Result<()> {
        info!("pipeline shutting down");

        // The inference task polls this flag in every blocked wait.
        self.running.store(false, Ordering::SeqCst);
        let outcome = self
            .inference_task
            .join()
            .map_err(|_| PipelineError::Other(anyhow!("inference task panicked")))?;

        // Closing the control queue releases the capture task whether it is
        // armed or running. Outstanding clones of the control handle delay
        // this until they are dropped too.
        self.capture.stop();
        drop(self.capture);
        self.capture_task
            .join()
            .map_err(|_| PipelineError::Other(anyhow!("capture task panicked")))?;

        // The inference task owned the only result sender; the queue is now
        // closed and delivery drains what is left.
        self.delivery_task
            .join()
            .map_err(|_| PipelineError::Other(anyhow!("delivery task panicked")))?;

        info!("pipeline stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::audio::SourceMode;
    use crate::capture::NullDriver;
    use crate::inference::stub::{JoinDecoder, StubBackend};

    struct SinkPublisher;

    impl Publisher for SinkPublisher {
        fn publish(&mut self, _payload: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn test_parts() -> PipelineParts {
        PipelineParts {
            source: AudioSource::new(vec![0i16; 64], 16, SourceMode::Polling).expect("source"),
            driver: Box::new(NullDriver),
            backend: Box::new(StubBackend::new()),
            decoder: Box::new(JoinDecoder),
            publisher: Box::new(SinkPublisher),
            hub: NotificationHub::new(4),
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            sample_rate: 16,
            block_samples: 16,
            block_count: 4,
            window_samples: 32,
            aggregate_count: 2,
            iteration_delay: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn spawn_then_shutdown_without_starting_is_clean() {
        let pipeline = Pipeline::spawn(test_config(), test_parts()).expect("spawn");
        assert_eq!(pipeline.diagnostics().iterations, 0);
        pipeline.shutdown().expect("shutdown");
    }

    #[test]
    fn started_pipeline_produces_results_and_shuts_down() {
        let pipeline = Pipeline::spawn(test_config(), test_parts()).expect("spawn");
        let events = pipeline.events();
        pipeline.start();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pipeline.diagnostics().flushes == 0 {
            assert!(std::time::Instant::now() < deadline, "no flush in time");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(events.poll(crate::events::INFERENCE_START) == 0, "start bit consumed");

        pipeline.stop();
        pipeline.shutdown().expect("shutdown");
    }
}
