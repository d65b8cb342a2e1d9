//! Artifact identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Immutable handle to one artifact write.
///
/// Two writes under the same name always yield distinct refs, even when the
/// bytes are identical; the bytes themselves are shared by digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Store-wide sequence number, starting at 1.
    pub id: u64,
    /// Logical artifact name, e.g. "LAMBDA_BUILD".
    pub name: String,
    /// SHA-256 of the content, hex-encoded.
    pub digest: String,
    /// Content length in bytes.
    pub size: u64,
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}#{}@{}", self.name, self.id, short)
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
