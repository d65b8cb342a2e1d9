//! Run results returned by the engine.

use std::collections::BTreeMap;

use serde::Serialize;

use deployline_artifacts::ArtifactRef;
use deployline_core::Stage;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Not started because an earlier stage failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed { reason: String },
    /// Never invoked (stage inputs missing or stage skipped).
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub status: ActionStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub actions: Vec<ActionReport>,
}

impl StageReport {
    /// A report for a stage whose actions were never invoked.
    pub(crate) fn not_run(stage: &Stage, status: StageStatus) -> Self {
        Self {
            name: stage.name.clone(),
            status,
            actions: stage
                .actions
                .iter()
                .map(|a| ActionReport {
                    name: a.name.clone(),
                    status: ActionStatus::NotRun,
                    elapsed_ms: 0,
                })
                .collect(),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub stages: Vec<StageReport>,
    /// Artifacts produced by this run, by name.
    pub artifacts: BTreeMap<String, ArtifactRef>,
    /// The error that stopped the run, if it failed.
    pub failure: Option<PipelineError>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn artifact(&self, name: &str) -> Option<&ArtifactRef> {
        self.artifacts.get(name)
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Turn a failed run into its error.
    pub fn into_result(self) -> PipelineResult<Self> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self),
        }
    }
}
