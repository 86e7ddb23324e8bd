//! `StubBackend` — placeholder stages that echo window metadata instead of
//! running a model. Lets the full capture/coordination pipeline be
//! exercised end-to-end before a real backend is integrated.

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::inference::{Classification, InferenceBackend, OutputDecoder};

/// Echo-style backend: each pass yields one classification naming the pass
/// number and the window length it saw.
pub struct StubBackend {
    pass: u32,
    prepared: Option<usize>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            pass: 0,
            prepared: None,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for StubBackend {
    fn initialize(&mut self) -> Result<()> {
        debug!("StubBackend::initialize — no-op");
        Ok(())
    }

    fn preprocess(&mut self, window: &[i16]) -> Result<()> {
        self.prepared = Some(window.len());
        Ok(())
    }

    fn infer(&mut self) -> Result<()> {
        if self.prepared.is_none() {
            return Err(PipelineError::Inference("no prepared input".into()));
        }
        Ok(())
    }

    fn postprocess(&mut self) -> Result<Vec<Classification>> {
        let samples = self
            .prepared
            .take()
            .ok_or_else(|| PipelineError::Postprocess("no model output".into()))?;
        self.pass += 1;
        Ok(vec![Classification {
            label: format!("[stub pass {} over {} samples]", self.pass, samples),
            score: 1.0,
        }])
    }
}

/// Joins classification labels with spaces.
pub struct JoinDecoder;

impl OutputDecoder for JoinDecoder {
    fn decode(&mut self, combined: &[Classification]) -> Result<String> {
        Ok(combined
            .iter()
            .map(|c| c.label.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }
}
