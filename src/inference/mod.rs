//! Classification stage seams used by the inference coordinator.
//!
//! The numeric content of pre-processing, model execution, post-processing
//! and decoding lives behind these traits. The coordinator only sequences
//! and counts; swap in a real backend (feature extractor + accelerator +
//! CTC decoder, say) without touching the loop.
//!
//! `&mut self` on the stage methods intentionally expresses that backends
//! are stateful — tensor arenas, feature caches, decoder contexts. All
//! calls come from the single coordinator thread.

pub mod stub;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One label/score pair produced by the classifier for an inference pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Outcome of a single inference iteration.
#[derive(Debug, Clone)]
pub struct IterationResult {
    /// Classifications in the order the classifier produced them.
    pub classifications: Vec<Classification>,
    /// Seconds. The time the iteration started, not the time of the audio
    /// segment that fed it.
    pub timestamp: f32,
    /// Index of this iteration within the current aggregation window.
    pub inference_index: u32,
}

/// Contract for the pre-process / infer / post-process stage chain.
pub trait InferenceBackend: Send + 'static {
    /// One-time bring-up: load the model, initialise the accelerator. Run
    /// after the first observed start signal; failure aborts the inference
    /// task since running without the model would corrupt nothing but
    /// produce nothing.
    fn initialize(&mut self) -> Result<()>;

    /// Turn an audio window into the model input. A failure skips the
    /// iteration but keeps the loop alive.
    fn preprocess(&mut self, window: &[i16]) -> Result<()>;

    /// Run the model over the prepared input. A failure here is fatal to
    /// the inference loop — model state afterwards is unspecified.
    fn infer(&mut self) -> Result<()>;

    /// Map the model output to per-iteration classifications. A failure
    /// skips the iteration but keeps the loop alive.
    fn postprocess(&mut self) -> Result<Vec<Classification>>;
}

/// Decodes a combined classification sequence into the recognised string.
pub trait OutputDecoder: Send + 'static {
    fn decode(&mut self, combined: &[Classification]) -> Result<String>;
}
