//! Pipeline configuration.

use std::time::Duration;

/// Configuration for the capture / inference pipeline.
///
/// Defaults mirror the reference deployment: 100 ms blocks at 16 kHz, a
/// four-block capture ring, two-block inference windows, and two inferences
/// aggregated per decoded result.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture sample rate in Hz. Default: 16000.
    pub sample_rate: u32,
    /// Samples per audio block delivered by the source. Default: 1600.
    pub block_samples: usize,
    /// Blocks in the circular capture buffer. Default: 4.
    pub block_count: usize,
    /// Samples per inference window. Must be a whole number of blocks.
    /// Default: 3200.
    pub window_samples: usize,
    /// Completed iterations aggregated before one decoded result is
    /// emitted. Default: 2.
    pub aggregate_count: usize,
    /// Fixed delay at the top of each inference iteration, yielding the
    /// processor to other tasks. Default: 10 ms.
    pub iteration_delay: Duration,
    /// Capacity of the capture control queue. Default: 10.
    pub control_queue_depth: usize,
    /// Capacity of the result delivery queue. Default: 10.
    pub result_queue_depth: usize,
    /// Upper bound on a single publish call. Default: 5000 ms.
    pub publish_timeout: Duration,
    /// Capacity of each notification subscriber's queue. Default: 10.
    pub notify_queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            block_samples: 1_600,
            block_count: 4,
            window_samples: 3_200,
            aggregate_count: 2,
            iteration_delay: Duration::from_millis(10),
            control_queue_depth: 10,
            result_queue_depth: 10,
            publish_timeout: Duration::from_millis(5_000),
            notify_queue_depth: 10,
        }
    }
}

impl PipelineConfig {
    /// Whole blocks per inference window.
    pub fn window_blocks(&self) -> usize {
        self.window_samples / self.block_samples
    }
}
