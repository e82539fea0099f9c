//! Object store collaborators.
//!
//! The stager only needs four capabilities: existence check, chunked put,
//! container bootstrap and URI formatting. `GcsStore` talks to Cloud Storage;
//! `LocalStore` mirrors the same contract on a local directory.

mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::dataset::{FileFormat, WorkItem};
use crate::error::{InfraError, StoreError};

/// Chunk size used by resumable uploads (must be a multiple of 256 KiB for GCS).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// A staged object. Its existence in the store is the source of truth for
/// "this item is done", independent of any local state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteArtifact {
    pub container: String,
    pub key: String,
    /// Fully-qualified location handed to the warehouse (e.g. `gs://bucket/key`).
    pub uri: String,
}

impl fmt::Display for RemoteArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Parameters for one upload.
#[derive(Debug, Clone, Copy)]
pub struct PutOptions {
    pub chunk_size: usize,
    pub timeout: Duration,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Capabilities the pipeline needs from an object store. Implementations are
/// bound to one container and are shared across worker threads.
pub trait ObjectStore: Send + Sync {
    /// Container (bucket) name.
    fn container(&self) -> &str;

    /// Whether an object exists under `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Upload the file at `local` to `key`, overwriting any existing object.
    fn put(&self, local: &Path, key: &str, opts: &PutOptions) -> Result<(), StoreError>;

    /// Make sure the container exists and is accessible, creating it if missing.
    fn ensure_container(&self) -> Result<(), InfraError>;

    /// Fully-qualified URI of `key`.
    fn uri(&self, key: &str) -> String;

    fn artifact(&self, key: &str) -> RemoteArtifact {
        RemoteArtifact {
            container: self.container().to_string(),
            key: key.to_string(),
            uri: self.uri(key),
        }
    }
}

/// Deterministic object key of an item: `{prefix}/{file name}`.
/// The prefix is trimmed of slashes; an empty prefix yields the bare file name.
pub fn object_key(prefix: &str, item: &WorkItem, format: FileFormat) -> String {
    key_for_file(prefix, &item.file_name(format))
}

pub(crate) fn key_for_file(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}
