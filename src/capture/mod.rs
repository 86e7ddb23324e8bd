//! Capture-side control: the start/stop queue and the capture task state
//! machine.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──run()──► ArmedWaitingForStart ──Start──► Running
//!                        ▲                           │
//!                        └──── scheduler returns ────┘
//! ```
//!
//! A `Stop` received while armed is ignored; the controller re-arms after
//! every scheduler run instead of exiting, so a later `Start` resumes
//! capture. One-time hardware bring-up happens on the first transition into
//! `Running` only; later cycles reuse the initialised driver path.

pub mod scheduler;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{error, info, warn};

use crate::audio::AudioSource;
use crate::buffering::CaptureSide;
use crate::error::Result;
use scheduler::BlockScheduler;

/// Control messages accepted by the capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Start,
    Stop,
}

/// Create the bounded capture control queue.
pub fn control_channel(depth: usize) -> (CaptureControl, Receiver<ControlMessage>) {
    let (tx, rx) = bounded(depth);
    (CaptureControl { tx }, rx)
}

/// Cloneable sender handle for capture start/stop requests.
///
/// Sends never block: a full queue drops the request and logs the loss, so
/// this handle is safe to drive from any context.
#[derive(Clone)]
pub struct CaptureControl {
    tx: Sender<ControlMessage>,
}

impl CaptureControl {
    pub fn start(&self) {
        self.send(ControlMessage::Start);
    }

    pub fn stop(&self) {
        self.send(ControlMessage::Stop);
    }

    fn send(&self, msg: ControlMessage) {
        info!(?msg, "capture control request");
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                error!(?msg, "capture control queue full; request dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                error!(?msg, "capture task is gone; request dropped");
            }
        }
    }
}

/// One-time hardware bring-up hook, run on the first transition to
/// `Running`.
pub trait AudioDriver: Send {
    fn setup(&mut self) -> Result<()>;
}

/// No-op driver for storage-backed (polling) sources.
pub struct NullDriver;

impl AudioDriver for NullDriver {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capture task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    ArmedWaitingForStart,
    Running,
}

/// Owns the audio source and drives the synchronous block-processing loop
/// while gated by the control queue.
pub struct CaptureController {
    source: AudioSource,
    capture: CaptureSide,
    control: Receiver<ControlMessage>,
    driver: Box<dyn AudioDriver>,
    scheduler: Box<dyn BlockScheduler>,
    state: CaptureState,
    hardware_ready: bool,
}

impl CaptureController {
    pub fn new(
        source: AudioSource,
        capture: CaptureSide,
        control: Receiver<ControlMessage>,
        driver: Box<dyn AudioDriver>,
        scheduler: Box<dyn BlockScheduler>,
    ) -> Self {
        Self {
            source,
            capture,
            control,
            driver,
            scheduler,
            state: CaptureState::Idle,
            hardware_ready: false,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Run the capture task until the control channel closes.
    pub fn run(&mut self) {
        info!("capture task started");
        self.state = CaptureState::ArmedWaitingForStart;

        loop {
            // Wait for a Start; a Stop while armed is ignored.
            loop {
                match self.control.recv() {
                    Ok(ControlMessage::Start) => break,
                    Ok(ControlMessage::Stop) => continue,
                    Err(_) => {
                        info!("control channel closed; capture task exiting");
                        self.state = CaptureState::Idle;
                        return;
                    }
                }
            }

            if !self.hardware_ready {
                match self.driver.setup() {
                    Ok(()) => {
                        info!("audio driver initialised");
                        self.hardware_ready = true;
                    }
                    Err(e) => {
                        error!(error = %e, "audio driver setup failed; staying armed");
                        continue;
                    }
                }
            }

            self.state = CaptureState::Running;
            let outcome = self
                .scheduler
                .run(&self.source, &self.capture, &self.control);
            match &outcome.error {
                None => info!(
                    iterations = outcome.iterations,
                    "block scheduler stopped"
                ),
                Some(e) => warn!(
                    iterations = outcome.iterations,
                    error = %e,
                    "block scheduler terminated with error"
                ),
            }
            self.state = CaptureState::ArmedWaitingForStart;
        }
    }
}
