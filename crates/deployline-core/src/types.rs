//! Shared identity types used across Deployline crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a deployable version, as returned by the
/// provisioning layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VersionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Deployable unit ──────────────────────────────────────────────

/// A service that is built by a pipeline and rolled out behind an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableUnit {
    pub name: String,
    /// Alias that routes live traffic for this unit.
    pub alias: String,
    /// Grants the provisioning layer must resolve before the version runs.
    #[serde(default)]
    pub permissions: Vec<PermissionRequest>,
}

/// Access a deployable unit needs on an external resource
/// (e.g. read/write on a table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub resource: String,
    pub access: Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn allows_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn allows_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}
