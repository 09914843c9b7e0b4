//! Artifact store seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Accepts a finished artifact and returns a public URL for it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `path` under `folder`, in parts of `chunk_size` bytes when the
    /// file is larger than one part.
    async fn upload_artifact(&self, path: &Path, folder: &str, chunk_size: usize) -> StorageResult<String>;

    /// Cheap reachability check for readiness probes.
    async fn check_connectivity(&self) -> StorageResult<()>;
}
