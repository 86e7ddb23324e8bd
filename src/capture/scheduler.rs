//! Synchronous block-processing scheduler driven by the capture task.
//!
//! The scheduler seam corresponds to the generated dataflow graph of the
//! reference deployment: given the audio source, the capture half of the
//! double buffer, and the control queue, it runs until the queue yields
//! `Stop` (or the queue disappears) and reports how many windows it
//! delivered.

use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::debug;

use crate::audio::AudioSource;
use crate::buffering::CaptureSide;
use crate::capture::ControlMessage;
use crate::error::PipelineError;
use crate::sync::SharedTimestamp;

/// Result of one scheduler run.
#[derive(Debug)]
pub struct SchedulerOutcome {
    /// Completed window deliveries (write + swap) in this run.
    pub iterations: u32,
    pub error: Option<PipelineError>,
}

/// The synchronous dataflow seam driven by `CaptureController` while
/// `Running`.
///
/// Implementations must terminate on `Stop`, ignore redundant `Start`
/// messages, perform at least one `write_from` + `swap_and_signal` per
/// delivered window, and be restartable without reinitialising hardware.
pub trait BlockScheduler: Send {
    fn run(
        &mut self,
        source: &AudioSource,
        capture: &CaptureSide,
        control: &Receiver<ControlMessage>,
    ) -> SchedulerOutcome;
}

/// Default scheduler: accumulates whole blocks into a window, stamps the
/// shared timestamp with the stream position, then swaps the window over to
/// the inference side.
pub struct WindowScheduler {
    window: Vec<i16>,
    filled: usize,
    timestamp: Arc<SharedTimestamp>,
    sample_rate: u32,
    samples_delivered: u64,
}

impl WindowScheduler {
    pub fn new(window_samples: usize, sample_rate: u32, timestamp: Arc<SharedTimestamp>) -> Self {
        Self {
            window: vec![0i16; window_samples],
            filled: 0,
            timestamp,
            sample_rate,
            samples_delivered: 0,
        }
    }

    /// Consume one block from the source. Returns `true` when the
    /// accumulated window was delivered (written, stamped and swapped).
    fn step(&mut self, source: &AudioSource, capture: &CaptureSide) -> bool {
        source.wait_for_block();
        let block = source.current_block();
        let n = block.len().min(self.window.len() - self.filled);
        self.window[self.filled..self.filled + n].copy_from_slice(&block[..n]);
        self.filled += n;
        self.samples_delivered += n as u64;

        if self.filled < self.window.len() {
            return false;
        }

        capture.write_from(&self.window);
        self.timestamp
            .set(self.samples_delivered as f32 / self.sample_rate as f32);
        capture.swap_and_signal();
        self.filled = 0;
        true
    }
}

impl BlockScheduler for WindowScheduler {
    fn run(
        &mut self,
        source: &AudioSource,
        capture: &CaptureSide,
        control: &Receiver<ControlMessage>,
    ) -> SchedulerOutcome {
        let mut iterations = 0u32;
        // A fresh run never resumes a half-filled window from a prior cycle.
        self.filled = 0;

        loop {
            match control.try_recv() {
                Ok(ControlMessage::Stop) => {
                    debug!(iterations, "stop received; scheduler terminating");
                    return SchedulerOutcome {
                        iterations,
                        error: None,
                    };
                }
                Ok(ControlMessage::Start) => {
                    // Already running — idempotent.
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return SchedulerOutcome {
                        iterations,
                        error: Some(PipelineError::ControlChannelClosed),
                    };
                }
            }

            if self.step(source, capture) {
                iterations += 1;
            }
        }
    }
}
