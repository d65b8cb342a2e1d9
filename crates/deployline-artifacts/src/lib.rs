//! deployline-artifacts — append-only artifact store for Deployline.
//!
//! Backed by [redb](https://docs.rs/redb). Pipeline stages `put` their
//! outputs here and later stages `get` them by [`ArtifactRef`].
//!
//! # Layout
//!
//! Refs are keyed by a store-wide sequence id and carry the logical name,
//! SHA-256 digest, and size of their content. Content lives in a separate
//! table keyed by digest, so identical outputs are stored once while every
//! write still gets its own identity.
//!
//! The `ArtifactStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{ArtifactError, ArtifactResult};
pub use store::ArtifactStore;
pub use types::{ArtifactRef, content_digest};
