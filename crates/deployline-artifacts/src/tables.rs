//! redb table definitions for the artifact store.

use redb::TableDefinition;

/// Artifact refs keyed by their store-wide sequence id. Values are
/// JSON-serialized `ArtifactRef`s.
pub const REFS: TableDefinition<u64, &[u8]> = TableDefinition::new("artifact_refs");

/// Artifact bytes keyed by SHA-256 hex digest. Identical content is stored once.
pub const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifact_blobs");
