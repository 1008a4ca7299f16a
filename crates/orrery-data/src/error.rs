//! Error kinds of the data layer.
//!
//! None of these reach callers of the quadtree: jobs that fail are retried or
//! settle on ancestor data, and the shape logs what happened.

use orrery_surface::PatchId;

/// Why a tile job produced no data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataJobError {
    /// Transient failure; the job is retried once.
    #[error("data job for {id} failed: {reason}")]
    DataJobFailure { id: PatchId, reason: String },

    /// The texture tile cannot be loaded; the patch keeps its ancestor tile.
    #[error("texture for {id} unavailable: {reason}")]
    TextureUnavailable { id: PatchId, reason: String },

    /// A request named a patch that cannot exist.
    #[error("invalid patch identity {id}")]
    InvalidPatchIdentity { id: PatchId },

    /// More work was requested this frame than the budget allows.
    #[error("budget of {budget} exceeded ({requested} requested)")]
    BudgetExceeded { requested: usize, budget: usize },
}

impl DataJobError {
    /// Transient errors get one more attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataJobError::DataJobFailure { .. })
    }
}

/// Failure to bring the worker pool up.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to spawn data worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
