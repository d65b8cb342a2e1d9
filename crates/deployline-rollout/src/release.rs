//! Hand a successful pipeline run's artifact to a canary rollout.
//!
//! ```text
//! RunResult ──artifact──▶ Provisioner::create_version ──VersionId──▶ CanaryController
//! ```
//!
//! The first release of a unit has nothing to shift away from: the alias is
//! created pointing at the new version and no rollout is started.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use deployline_artifacts::{ArtifactRef, ArtifactStore};
use deployline_core::{AlarmSpec, AutoRollbackConfig, CanaryPlan, DeployableUnit, VersionId};
use deployline_pipeline::RunResult;

use crate::controller::{CanaryController, RolloutHandle};
use crate::error::{RolloutError, RolloutResult};

/// Turns artifact bytes into a runnable version.
///
/// Implementations own everything about how a version runs, including
/// resolving the unit's permission requests.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_version(
        &self,
        unit: &DeployableUnit,
        artifact: &ArtifactRef,
        bytes: &[u8],
    ) -> anyhow::Result<VersionId>;
}

/// Result of [`Release::deliver`].
#[derive(Debug)]
pub struct Delivery {
    pub version: VersionId,
    /// `None` when this was the unit's first version.
    pub rollout: Option<RolloutHandle>,
}

pub struct Release {
    store: ArtifactStore,
    provisioner: Arc<dyn Provisioner>,
    controller: CanaryController,
}

impl Release {
    pub fn new(
        store: ArtifactStore,
        provisioner: Arc<dyn Provisioner>,
        controller: CanaryController,
    ) -> Self {
        Self {
            store,
            provisioner,
            controller,
        }
    }

    pub fn controller(&self) -> &CanaryController {
        &self.controller
    }

    /// Provision `artifact_name` from `run` and roll it out on `unit.alias`.
    pub async fn deliver(
        &self,
        unit: &DeployableUnit,
        artifact_name: &str,
        run: &RunResult,
        plan: CanaryPlan,
        alarm: AlarmSpec,
    ) -> RolloutResult<Delivery> {
        self.deliver_with(unit, artifact_name, run, plan, alarm, AutoRollbackConfig::default())
            .await
    }

    pub async fn deliver_with(
        &self,
        unit: &DeployableUnit,
        artifact_name: &str,
        run: &RunResult,
        plan: CanaryPlan,
        alarm: AlarmSpec,
        auto_rollback: AutoRollbackConfig,
    ) -> RolloutResult<Delivery> {
        if !run.succeeded() {
            return Err(RolloutError::RunFailed {
                run_id: run.run_id.clone(),
            });
        }
        let artifact = run
            .artifact(artifact_name)
            .ok_or_else(|| RolloutError::MissingArtifact {
                run_id: run.run_id.clone(),
                artifact: artifact_name.to_string(),
            })?;
        let bytes = self.store.get(artifact)?;

        let version = self
            .provisioner
            .create_version(unit, artifact, &bytes)
            .await
            .map_err(|e| RolloutError::Provisioning(format!("{e:#}")))?;
        info!(
            unit = %unit.name,
            alias = %unit.alias,
            %artifact,
            %version,
            "version provisioned"
        );

        let aliases = self.controller.aliases();
        match aliases.create(&unit.alias, version.clone()).await {
            Ok(_) => {
                return Ok(Delivery {
                    version,
                    rollout: None,
                });
            }
            Err(RolloutError::AliasExists(_)) => {}
            Err(e) => return Err(e),
        }

        let handle = self
            .controller
            .start_rollout_with(&unit.alias, version.clone(), plan, alarm, auto_rollback)
            .await?;
        Ok(Delivery {
            version,
            rollout: Some(handle),
        })
    }
}
