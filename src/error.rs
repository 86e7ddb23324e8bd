use thiserror::Error;

/// All errors produced by speechflow.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audio source error: {0}")]
    AudioSource(String),

    #[error("audio driver error: {0}")]
    AudioDriver(String),

    #[error("pre-processing error: {0}")]
    Preprocess(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("post-processing error: {0}")]
    Postprocess(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("capture control channel closed")]
    ControlChannelClosed,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
