//! ArtifactStore — redb-backed, append-only artifact persistence.
//!
//! Every `put` appends a new ref with the next sequence id; refs are never
//! rewritten or removed. Content is stored once per digest. The store
//! supports both on-disk and in-memory backends (the latter for tests and
//! one-shot runs).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use crate::error::{ArtifactError, ArtifactResult};
use crate::tables::{BLOBS, REFS};
use crate::types::{ArtifactRef, content_digest};

/// Convert any `Display` error into an `ArtifactError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| ArtifactError::$variant(e.to_string())
    };
}

/// Thread-safe artifact store backed by redb.
#[derive(Clone)]
pub struct ArtifactStore {
    db: Arc<Database>,
}

impl ArtifactStore {
    /// Open (or create) a persistent artifact store at the given path.
    pub fn open(path: &Path) -> ArtifactResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "artifact store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory artifact store.
    pub fn open_in_memory() -> ArtifactResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory artifact store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> ArtifactResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(REFS).map_err(map_err!(Table))?;
        txn.open_table(BLOBS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Append an artifact under `name` and return its new ref.
    pub fn put(&self, name: &str, bytes: &[u8]) -> ArtifactResult<ArtifactRef> {
        let digest = content_digest(bytes);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let artifact;
        {
            let mut refs = txn.open_table(REFS).map_err(map_err!(Table))?;
            let id = refs
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);

            artifact = ArtifactRef {
                id,
                name: name.to_string(),
                digest: digest.clone(),
                size: bytes.len() as u64,
            };
            let value = serde_json::to_vec(&artifact).map_err(map_err!(Serialize))?;
            refs.insert(id, value.as_slice()).map_err(map_err!(Write))?;

            let mut blobs = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            let known = blobs
                .get(digest.as_str())
                .map_err(map_err!(Read))?
                .is_some();
            if !known {
                blobs
                    .insert(digest.as_str(), bytes)
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(artifact = %artifact, size = artifact.size, "artifact stored");
        Ok(artifact)
    }

    /// Read the bytes behind a ref.
    ///
    /// Fails with `NotFound` if the ref was never written by this store.
    pub fn get(&self, artifact: &ArtifactRef) -> ArtifactResult<Vec<u8>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let refs = txn.open_table(REFS).map_err(map_err!(Table))?;
        let stored: ArtifactRef = match refs.get(artifact.id).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => return Err(ArtifactError::NotFound(artifact.to_string())),
        };
        if stored != *artifact {
            return Err(ArtifactError::NotFound(artifact.to_string()));
        }

        let blobs = txn.open_table(BLOBS).map_err(map_err!(Table))?;
        let bytes = match blobs
            .get(stored.digest.as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => guard.value().to_vec(),
            None => {
                return Err(ArtifactError::Corrupt {
                    id: stored.id,
                    expected: stored.digest,
                    actual: "<missing>".to_string(),
                });
            }
        };

        let actual = content_digest(&bytes);
        if actual != stored.digest {
            return Err(ArtifactError::Corrupt {
                id: stored.id,
                expected: stored.digest,
                actual,
            });
        }
        Ok(bytes)
    }

    /// Look up a ref by its sequence id.
    pub fn resolve(&self, id: u64) -> ArtifactResult<Option<ArtifactRef>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let refs = txn.open_table(REFS).map_err(map_err!(Table))?;
        match refs.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let artifact: ArtifactRef =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(artifact))
            }
            None => Ok(None),
        }
    }

    /// All refs written under `name`, oldest first.
    pub fn list_refs(&self, name: &str) -> ArtifactResult<Vec<ArtifactRef>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let refs = txn.open_table(REFS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in refs.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let artifact: ArtifactRef =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if artifact.name == name {
                results.push(artifact);
            }
        }
        Ok(results)
    }

    /// The most recent ref written under `name`.
    pub fn latest(&self, name: &str) -> ArtifactResult<Option<ArtifactRef>> {
        Ok(self.list_refs(name)?.pop())
    }

    /// Total number of refs written.
    pub fn len(&self) -> ArtifactResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let refs = txn.open_table(REFS).map_err(map_err!(Table))?;
        refs.len().map_err(map_err!(Read))
    }

    pub fn is_empty(&self) -> ArtifactResult<bool> {
        Ok(self.len()? == 0)
    }
}
