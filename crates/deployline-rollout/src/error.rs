//! Rollout error types.

use thiserror::Error;

use deployline_core::ConfigError;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("unknown alias: {0}")]
    UnknownAlias(String),

    #[error("alias already exists: {0}")]
    AliasExists(String),

    /// The alias already has a non-terminal rollout.
    #[error("rollout {id} is already in progress on alias {alias}")]
    RolloutInProgress { alias: String, id: String },

    #[error("no active rollout on alias {0}")]
    NoActiveRollout(String),

    #[error("invalid rollout: {0}")]
    Validation(String),

    /// Release was asked to deliver from a run that did not succeed.
    #[error("pipeline run {run_id} did not succeed")]
    RunFailed { run_id: String },

    #[error("run {run_id} produced no artifact named {artifact}")]
    MissingArtifact { run_id: String, artifact: String },

    #[error("artifact error: {0}")]
    Artifact(#[from] deployline_artifacts::ArtifactError),

    #[error("provisioning failed: {0}")]
    Provisioning(String),
}

impl From<ConfigError> for RolloutError {
    fn from(e: ConfigError) -> Self {
        RolloutError::Validation(e.to_string())
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
