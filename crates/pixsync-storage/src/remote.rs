//! The remote store seam.
//!
//! Everything the file service needs from the cloud provider goes through
//! `RemoteStore`: folder listing, full and thumbnail downloads, uploads,
//! deletes, and the session lifecycle. Implementations report transfer
//! progress as a fraction in [0.0, 1.0] through an optional sink.

use async_trait::async_trait;
use bytes::Bytes;
use pixsync_core::types::ThumbnailSpec;
use pixsync_core::RemoteError;

use crate::session::SessionHandle;

/// Progress sink: receives the completed fraction of a transfer.
pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

/// One entry of a folder listing as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    /// Canonical lower-cased path; absent for entries that cannot be fetched
    pub path_lower: Option<String>,
}

/// Metadata returned alongside downloaded content and by uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub path_lower: Option<String>,
    pub size: u64,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the direct children of `path` (`""` is the root).
    async fn list_folder(&self, path: &str) -> Result<Vec<ListEntry>, RemoteError>;

    /// Download the full content of `path`.
    async fn download(
        &self,
        path: &str,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError>;

    /// Download a rendered thumbnail of the image at `path`.
    async fn get_thumbnail(
        &self,
        path: &str,
        spec: ThumbnailSpec,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError>;

    /// Upload `data` to `path`, overwriting any existing file.
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        progress: Option<&ProgressFn>,
    ) -> Result<FileMetadata, RemoteError>;

    async fn delete(&self, path: &str) -> Result<(), RemoteError>;

    /// The live session, if the user has linked an account.
    fn authorized_session(&self) -> Option<SessionHandle>;

    /// Drop the live session. Idempotent.
    fn invalidate_session(&self);

    /// Provider name for display.
    fn name(&self) -> &str;
}

/// Forward a progress fraction to an optional sink.
pub fn report(progress: Option<&ProgressFn>, fraction: f64) {
    if let Some(p) = progress {
        p(fraction);
    }
}
