//! Block-based audio source backed by a circular capture buffer.
//!
//! # Design constraints
//!
//! In interrupt mode the block-delivery callback runs in interrupt context.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! `on_block_received` satisfies that contract: it advances two atomic
//! indices and raises a binary wake signal.
//!
//! In polling mode (audio read from static storage instead of live
//! hardware) the index advances deterministically on each read and no
//! interrupt is involved; once the end of the backing buffer is reached the
//! blocks repeat.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::sync::WakeSignal;

/// How block advancement is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// The readable block is published by `on_block_received`, called from
    /// the audio interrupt path; readers park on the wake signal.
    Interrupt,
    /// Each `current_block` call advances the index itself, modulo the
    /// block count. Readers never block.
    Polling,
}

/// View over a circular buffer of fixed-size audio blocks.
///
/// The backing buffer is written by hardware (or pre-filled from storage)
/// and never mutated through this type; it outlives the pipeline.
pub struct AudioSource {
    samples: Arc<[i16]>,
    block_samples: usize,
    block_count: usize,
    mode: SourceMode,
    /// Block currently readable.
    current: AtomicUsize,
    /// Block the hardware is writing into (interrupt mode only).
    under_write: AtomicUsize,
    signal: WakeSignal,
}

impl AudioSource {
    /// Wrap `samples` as a circular buffer of `block_samples`-sized blocks.
    ///
    /// Trailing samples that do not fill a whole block are dropped. This is
    /// an accepted fidelity loss of a fraction of a second, not an error.
    ///
    /// # Errors
    /// Returns `PipelineError::AudioSource` if fewer than one whole block of
    /// samples is supplied.
    pub fn new(mut samples: Vec<i16>, block_samples: usize, mode: SourceMode) -> Result<Self> {
        if block_samples == 0 {
            return Err(PipelineError::AudioSource(
                "block size must be non-zero".into(),
            ));
        }

        let usable = (samples.len() / block_samples) * block_samples;
        if usable < samples.len() {
            debug!(
                dropped = samples.len() - usable,
                "trailing samples do not fill a whole block"
            );
            samples.truncate(usable);
        }

        let block_count = samples.len() / block_samples;
        if block_count == 0 {
            return Err(PipelineError::AudioSource(format!(
                "audio shorter than one block ({block_samples} samples)"
            )));
        }

        Ok(Self {
            samples: samples.into(),
            block_samples,
            block_count,
            mode,
            current: AtomicUsize::new(0),
            under_write: AtomicUsize::new(0),
            signal: WakeSignal::new(),
        })
    }

    /// Load a polling-mode source from a WAV file.
    ///
    /// Multi-channel files are downmixed to mono by averaging.
    pub fn from_wav(path: &Path, block_samples: usize) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let interleaved: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
                reader.samples::<i16>().collect::<std::result::Result<_, _>>()?
            }
            hound::SampleFormat::Int => {
                let shift = spec.bits_per_sample - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<std::result::Result<_, _>>()?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<std::result::Result<_, _>>()?,
        };

        let samples = if spec.channels <= 1 {
            interleaved
        } else {
            let ch = spec.channels as usize;
            interleaved
                .chunks_exact(ch)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / ch as i32) as i16
                })
                .collect()
        };

        info!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            samples = samples.len(),
            "loaded audio from WAV"
        );

        Self::new(samples, block_samples, SourceMode::Polling)
    }

    pub fn block_samples(&self) -> usize {
        self.block_samples
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// The currently readable block.
    ///
    /// Polling mode advances the index on each call; interrupt mode returns
    /// whatever block the interrupt path last published.
    pub fn current_block(&self) -> &[i16] {
        let idx = match self.mode {
            SourceMode::Polling => {
                let idx = self.current.load(Ordering::Relaxed);
                self.current
                    .store((idx + 1) % self.block_count, Ordering::Relaxed);
                idx
            }
            SourceMode::Interrupt => self.current.load(Ordering::Acquire),
        };
        &self.samples[idx * self.block_samples..(idx + 1) * self.block_samples]
    }

    /// Block until the interrupt path delivers a new block. Returns
    /// immediately in polling mode.
    pub fn wait_for_block(&self) {
        if self.mode == SourceMode::Interrupt {
            self.signal.wait();
        }
    }

    /// Interrupt-context entry point: publish the block the hardware just
    /// finished, advance the write target, and wake the single waiting
    /// reader. Allocation-free and non-blocking.
    pub fn on_block_received(&self) {
        let w = self.under_write.load(Ordering::Relaxed);
        self.current.store(w, Ordering::Release);
        self.under_write
            .store((w + 1) % self.block_count, Ordering::Relaxed);
        self.signal.raise();
    }
}
