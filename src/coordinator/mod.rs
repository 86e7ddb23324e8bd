//! Inference coordination loop.
//!
//! One thread owns the inference side of the double buffer, the backend and
//! the decoder, and sequences the stage chain:
//!
//! ```text
//!   wait start ─► initialize ─► ┌─────────────────────────────┐
//!                               │ delay ─ wait window ─ read  │
//!                               │ preprocess ─ infer ─ post   │
//!                               │ aggregate ─ decode ─ send   │
//!                               └──────────┬──────────────────┘
//!                        stop request ─────┘  (reset, wait for restart)
//! ```
//!
//! Stage failures are graded: pre/post-processing and decode failures skip
//! the affected iteration or flush and keep the loop alive; a model
//! execution failure terminates the task. A stop request discards any
//! partially aggregated results, so a restart never mixes audio from two
//! capture sessions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::buffering::InferenceSide;
use crate::delivery::{ResultMessage, ResultSender};
use crate::error::{PipelineError, Result};
use crate::events::{SystemEvents, INFERENCE_START, INFERENCE_STOP};
use crate::inference::{InferenceBackend, IterationResult, OutputDecoder};
use crate::notify::NotificationHub;
use crate::sync::SharedTimestamp;

/// How often blocked waits recheck the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Counters exported by the coordinator, updated lock-free from the loop.
#[derive(Default)]
pub struct CoordinatorDiagnostics {
    iterations: AtomicU64,
    stage_errors: AtomicU64,
    flushes: AtomicU64,
    stop_cycles: AtomicU64,
}

/// Point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    /// Windows consumed from the exchange buffer.
    pub iterations: u64,
    /// Non-fatal stage failures (pre-process, post-process, decode).
    pub stage_errors: u64,
    /// Aggregations decoded and handed to delivery.
    pub flushes: u64,
    /// Stop requests honoured by the loop.
    pub stop_cycles: u64,
}

impl CoordinatorDiagnostics {
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            stage_errors: self.stage_errors.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            stop_cycles: self.stop_cycles.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the coordinator thread needs, passed explicitly at spawn.
pub struct CoordinatorContext {
    pub inference: InferenceSide,
    pub events: Arc<SystemEvents>,
    pub backend: Box<dyn InferenceBackend>,
    pub decoder: Box<dyn OutputDecoder>,
    pub delivery: ResultSender,
    pub hub: NotificationHub,
    pub timestamp: Arc<SharedTimestamp>,
    pub running: Arc<AtomicBool>,
    pub aggregate_count: usize,
    pub iteration_delay: Duration,
    pub diagnostics: Arc<CoordinatorDiagnostics>,
}

/// Run the coordination loop until shutdown or a fatal stage failure.
pub fn run(mut ctx: CoordinatorContext) -> Result<()> {
    info!("inference coordinator started");

    // Gate on the first start request. A stop request that lands before any
    // start means the control flow upstream is broken.
    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        let hit = ctx
            .events
            .wait_any_take_timeout(INFERENCE_START | INFERENCE_STOP, SHUTDOWN_POLL);
        if hit & INFERENCE_STOP != 0 {
            error!("stop requested before the first start");
            return Err(PipelineError::Inference(
                "stop requested before the first start".into(),
            ));
        }
        if hit & INFERENCE_START != 0 {
            break;
        }
    }

    if let Err(e) = ctx.backend.initialize() {
        error!(error = %e, "backend initialisation failed");
        return Err(e);
    }
    info!("inference backend initialised");

    let window_len = ctx.inference.window_len();
    let mut results: Vec<IterationResult> = Vec::with_capacity(ctx.aggregate_count);
    let mut inference_index: u32 = 0;

    loop {
        loop {
            thread::sleep(ctx.iteration_delay);

            if !ctx.running.load(Ordering::Relaxed) {
                info!("shutdown flag observed; coordinator exiting");
                return Ok(());
            }
            if ctx.events.take(INFERENCE_STOP) != 0 {
                info!(
                    discarded = results.len(),
                    "stop request honoured; aggregation reset"
                );
                results.clear();
                inference_index = 0;
                ctx.diagnostics.bump(&ctx.diagnostics.stop_cycles);
                break;
            }

            // Bounded wait so the shutdown flag and stop requests are
            // observed even when capture has gone quiet.
            if !ctx.inference.wait_for_data_timeout(SHUTDOWN_POLL) {
                continue;
            }

            // Each iteration reads into fresh storage so aggregated results
            // never alias a window the capture side is about to overwrite.
            let mut window = vec![0i16; window_len];
            ctx.inference.read_into(&mut window);
            let timestamp = ctx.timestamp.get();
            ctx.diagnostics.bump(&ctx.diagnostics.iterations);

            if let Err(e) = ctx.backend.preprocess(&window) {
                warn!(error = %e, "pre-processing failed; iteration skipped");
                ctx.diagnostics.bump(&ctx.diagnostics.stage_errors);
                continue;
            }
            if let Err(e) = ctx.backend.infer() {
                error!(error = %e, "model execution failed; coordinator terminating");
                return Err(e);
            }
            let classifications = match ctx.backend.postprocess() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "post-processing failed; iteration skipped");
                    ctx.diagnostics.bump(&ctx.diagnostics.stage_errors);
                    continue;
                }
            };

            debug!(
                index = inference_index,
                timestamp, "iteration complete"
            );
            results.push(IterationResult {
                classifications,
                timestamp,
                inference_index,
            });
            inference_index += 1;

            if results.len() >= ctx.aggregate_count {
                flush(&mut ctx, &mut results);
                inference_index = 0;
            }
        }

        // Stopped. Park until the next start request, still honouring the
        // shutdown flag.
        loop {
            if !ctx.running.load(Ordering::Relaxed) {
                info!("shutdown flag observed while stopped; coordinator exiting");
                return Ok(());
            }
            if ctx
                .events
                .wait_any_take_timeout(INFERENCE_START, SHUTDOWN_POLL)
                != 0
            {
                info!("restart request honoured");
                break;
            }
        }
    }
}

/// Combine the aggregated iterations in arrival order, decode, and hand the
/// result to delivery and notification. Always leaves `results` empty.
fn flush(ctx: &mut CoordinatorContext, results: &mut Vec<IterationResult>) {
    for r in results.iter() {
        match ctx.decoder.decode(&r.classifications) {
            Ok(text) => info!(
                index = r.inference_index,
                timestamp = r.timestamp,
                text = %text,
                "aggregated iteration"
            ),
            Err(e) => debug!(
                index = r.inference_index,
                error = %e,
                "aggregated iteration not individually decodable"
            ),
        }
    }

    let combined: Vec<_> = results
        .iter()
        .flat_map(|r| r.classifications.iter().cloned())
        .collect();
    let last_timestamp = results.last().map(|r| r.timestamp).unwrap_or(0.0);
    results.clear();

    match ctx.decoder.decode(&combined) {
        Ok(text) => {
            ctx.delivery.send(ResultMessage { text: text.clone() });
            ctx.hub.publish(&text, last_timestamp);
            ctx.diagnostics.bump(&ctx.diagnostics.flushes);
        }
        Err(e) => {
            error!(error = %e, "decode failed; aggregation discarded");
            ctx.diagnostics.bump(&ctx.diagnostics.stage_errors);
        }
    }
}
