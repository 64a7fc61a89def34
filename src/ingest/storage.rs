//! Artifact storage seam. Uploading a local file yields the storage path that
//! is attached to a case through an `artifact` message.

use anyhow::Result;
use futures::future::BoxFuture;
use std::path::Path;

pub trait ArtifactStorage: Send + Sync {
    /// Uploads the file at `local_path` and returns its addressable storage path.
    fn upload<'a>(&'a self, local_path: &'a Path) -> BoxFuture<'a, Result<String>>;
}

/// Storage that performs no transfer and addresses artifacts by their local path.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPathStorage;

impl ArtifactStorage for LocalPathStorage {
    fn upload<'a>(&'a self, local_path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(local_path.to_string_lossy().into_owned()) })
    }
}
