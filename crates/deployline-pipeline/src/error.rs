//! Pipeline engine error types.

use serde::Serialize;
use thiserror::Error;

/// Errors that stop a pipeline run (or prevent it from starting).
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    /// The definition is malformed; rejected before anything executes.
    #[error("invalid pipeline: {0}")]
    Validation(String),

    /// A stage input was not available when the stage was about to start.
    #[error("stage {stage}: missing input artifact {artifact}")]
    MissingArtifact { stage: String, artifact: String },

    /// An action in a stage did not succeed.
    #[error("stage {stage}: action {action} failed: {reason}")]
    ActionFailure {
        stage: String,
        action: String,
        reason: String,
    },

    /// The artifact store rejected a read or write.
    #[error("artifact store error: {0}")]
    Artifact(String),
}

impl From<deployline_artifacts::ArtifactError> for PipelineError {
    fn from(e: deployline_artifacts::ArtifactError) -> Self {
        PipelineError::Artifact(e.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
