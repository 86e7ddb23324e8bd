//! # speechflow
//!
//! Real-time audio capture and inference coordination pipeline.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource → CaptureController → DoubleBuffer → coordinator::run
//!      │               ▲                                 │
//! on_block_received    │ control queue       aggregate + decode
//!   (interrupt)        │                                 │
//!                CaptureControl              ResultSender → DeliveryTask → Publisher
//!                                                      └──► NotificationHub
//! ```
//!
//! The block-delivery path is zero-alloc and non-blocking. All heap work
//! happens in the capture and inference threads, and the start/stop pair of
//! level flags in [`events`] gates the inference side independently of the
//! capture control queue.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod events;
pub mod inference;
pub mod notify;
pub mod pipeline;
pub mod sync;

// Convenience re-exports for downstream crates
pub use audio::{AudioSource, SourceMode};
pub use capture::{AudioDriver, CaptureControl, NullDriver};
pub use config::PipelineConfig;
pub use delivery::{Publisher, ResultMessage};
pub use error::{PipelineError, Result};
pub use events::SystemEvents;
pub use inference::{Classification, InferenceBackend, OutputDecoder};
pub use notify::{DetectionEvent, NotificationHub};
pub use pipeline::{Pipeline, PipelineParts};
