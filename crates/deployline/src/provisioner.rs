//! Local provisioner: a version is a file on disk named after its artifact.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use deployline_artifacts::ArtifactRef;
use deployline_core::{DeployableUnit, VersionId};
use deployline_rollout::Provisioner;

/// Writes each provisioned artifact to `<root>/<unit>/<version>`.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    root: PathBuf,
}

impl LocalProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// `<unit>-<artifact id>-<short digest>`; stable for a given artifact write.
pub fn version_for(unit: &DeployableUnit, artifact: &ArtifactRef) -> VersionId {
    let short = artifact.digest.get(..12).unwrap_or(&artifact.digest);
    VersionId::new(format!("{}-{}-{short}", unit.name, artifact.id))
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn create_version(
        &self,
        unit: &DeployableUnit,
        artifact: &ArtifactRef,
        bytes: &[u8],
    ) -> anyhow::Result<VersionId> {
        let version = version_for(unit, artifact);
        let dir = self.root.join(&unit.name);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(version.as_str());
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        // Grants are not enforced locally.
        for grant in &unit.permissions {
            warn!(
                unit = %unit.name,
                resource = %grant.resource,
                access = ?grant.access,
                "permission request not enforced by local provisioner"
            );
        }
        info!(unit = %unit.name, %version, path = %path.display(), "version written");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use deployline_artifacts::ArtifactStore;
    use deployline_core::{Access, PermissionRequest};

    use super::*;

    fn unit() -> DeployableUnit {
        DeployableUnit {
            name: "blog".to_string(),
            alias: "Current".to_string(),
            permissions: vec![PermissionRequest {
                resource: "BlogTable".to_string(),
                access: Access::ReadWrite,
            }],
        }
    }

    #[tokio::test]
    async fn writes_version_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open_in_memory().unwrap();
        let artifact = store.put("LAMBDA_BUILD", b"bundle").unwrap();

        let provisioner = LocalProvisioner::new(dir.path());
        let version = provisioner
            .create_version(&unit(), &artifact, b"bundle")
            .await
            .unwrap();

        assert!(version.as_str().starts_with("blog-1-"));
        let written = std::fs::read(dir.path().join("blog").join(version.as_str())).unwrap();
        assert_eq!(written, b"bundle");
    }

    #[test]
    fn same_bytes_distinct_writes_get_distinct_versions() {
        let store = ArtifactStore::open_in_memory().unwrap();
        let first = store.put("LAMBDA_BUILD", b"bundle").unwrap();
        let second = store.put("LAMBDA_BUILD", b"bundle").unwrap();
        assert_ne!(version_for(&unit(), &first), version_for(&unit(), &second));
    }
}
