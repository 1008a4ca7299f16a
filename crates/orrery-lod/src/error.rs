use orrery_data::PipelineError;

/// Errors raised while building a patched shape.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("failed to start the data pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("shape radius must be finite and non-negative, got {0}")]
    InvalidRadius(f64),
}
