//! `RemoteStore` over an OpenDAL operator.
//!
//! Object keys are the provider-normalized path: leading `/` stripped and
//! lower-cased, so lookups behave case-insensitively the way the hosted
//! provider does. Transfers move in `chunk_size` slices and report the
//! cumulative fraction after each one.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use opendal::{ErrorKind, Operator};
use std::sync::Arc;
use tracing::{debug, warn};

use pixsync_core::types::{normalize_path, ThumbnailSpec};
use pixsync_core::{RemoteError, RouteError};

use crate::remote::{report, FileMetadata, ListEntry, ProgressFn, RemoteStore};
use crate::session::{SessionHandle, SessionManager};
use crate::thumbnail::render_thumbnail;

/// Default transfer slice: 256 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Uploads land here first and are moved over the destination on commit.
/// Interrupted uploads may leave objects behind; listings skip the prefix.
pub const STAGING_DIR: &str = ".pixsync-staging/";

pub struct OpendalStore {
    op: Operator,
    sessions: Arc<SessionManager>,
    chunk_size: usize,
}

impl OpendalStore {
    pub fn new(op: Operator, sessions: Arc<SessionManager>) -> Self {
        OpendalStore {
            op,
            sessions,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the transfer slice size (minimum 1 byte).
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    fn require_session(&self) -> Result<SessionHandle, RemoteError> {
        self.sessions
            .authorized_session()
            .ok_or_else(|| RemoteError::Auth("no linked session".into()))
    }

    async fn read_object(
        &self,
        path: &str,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError> {
        let key = object_key(path);
        if key.is_empty() {
            return Err(RemoteError::BadInput("empty path".into()));
        }
        let meta = self.op.stat(&key).await.map_err(map_opendal_error)?;
        if meta.is_dir() {
            return Err(RouteError::Other(format!("{path} is a folder")).into());
        }

        let total = meta.content_length();
        let mut buf = BytesMut::with_capacity(total as usize);
        let mut offset = 0u64;
        while offset < total {
            let end = (offset + self.chunk_size as u64).min(total);
            let slice = self
                .op
                .read_with(&key)
                .range(offset..end)
                .await
                .map_err(map_opendal_error)?;
            buf.extend_from_slice(&slice.to_bytes());
            offset = end;
            report(progress, offset as f64 / total as f64);
        }
        if total == 0 {
            report(progress, 1.0);
        }

        debug!(path = %key, bytes = total, "downloaded");
        Ok((metadata_for(&key, total), buf.freeze()))
    }

    /// Stream `data` to `staging` in `chunk_size` slices. The writer is
    /// aborted on failure.
    async fn write_staged(
        &self,
        staging: &str,
        data: &Bytes,
        progress: Option<&ProgressFn>,
    ) -> Result<(), RemoteError> {
        let total = data.len();
        let mut writer = self.op.writer(staging).await.map_err(map_opendal_error)?;
        let mut offset = 0usize;
        while offset < total {
            let end = (offset + self.chunk_size).min(total);
            if let Err(e) = writer.write(data.slice(offset..end)).await {
                abort_writer(&mut writer).await;
                return Err(map_opendal_error(e));
            }
            offset = end;
            report(progress, offset as f64 / total as f64);
        }
        if let Err(e) = writer.close().await {
            abort_writer(&mut writer).await;
            return Err(map_opendal_error(e));
        }
        Ok(())
    }

    /// Move a fully written staging object over `key`. Backends without
    /// rename or copy get a single whole-object write of `data`.
    async fn commit(&self, staging: &str, key: &str, data: &Bytes) -> Result<(), RemoteError> {
        let cap = self.op.info().full_capability();
        if cap.rename {
            return self.op.rename(staging, key).await.map_err(map_opendal_error);
        }
        if cap.copy {
            self.op.copy(staging, key).await.map_err(map_opendal_error)?;
        } else {
            self.op
                .write(key, data.clone())
                .await
                .map_err(map_opendal_error)?;
        }
        self.discard(staging).await;
        Ok(())
    }

    async fn discard(&self, staging: &str) {
        if let Err(e) = self.op.delete(staging).await {
            warn!(key = %staging, error = %e, "failed to remove staged upload");
        }
    }
}

#[async_trait]
impl RemoteStore for OpendalStore {
    async fn list_folder(&self, path: &str) -> Result<Vec<ListEntry>, RemoteError> {
        self.require_session()?;
        let dir = dir_key(path);
        let entries = self.op.list(&dir).await.map_err(map_opendal_error)?;

        let mut listed: Vec<ListEntry> = entries
            .into_iter()
            .filter(|entry| entry.path() != dir && entry.path() != "/")
            .filter(|entry| !entry.path().starts_with(STAGING_DIR))
            .map(|entry| {
                let path_lower = entry
                    .metadata()
                    .mode()
                    .is_file()
                    .then(|| format!("/{}", normalize_path(entry.path())));
                ListEntry {
                    name: entry.name().trim_end_matches('/').to_string(),
                    path_lower,
                }
            })
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(dir = %dir, entries = listed.len(), "listed folder");
        Ok(listed)
    }

    async fn download(
        &self,
        path: &str,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError> {
        self.require_session()?;
        self.read_object(path, progress).await
    }

    async fn get_thumbnail(
        &self,
        path: &str,
        spec: ThumbnailSpec,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError> {
        self.require_session()?;
        let (meta, original) = self.read_object(path, progress).await?;

        let rendered = tokio::task::spawn_blocking(move || render_thumbnail(&original, spec))
            .await
            .map_err(|e| RemoteError::Client(format!("thumbnail task failed: {e}")))??;

        debug!(path = %path, bytes = rendered.len(), "rendered thumbnail");
        Ok((meta, Bytes::from(rendered)))
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        progress: Option<&ProgressFn>,
    ) -> Result<FileMetadata, RemoteError> {
        self.require_session()?;
        let key = object_key(path);
        if key.is_empty() || key.ends_with('/') || key.starts_with(STAGING_DIR) {
            return Err(RemoteError::BadInput(format!("not a file path: {path:?}")));
        }

        let total = data.len();
        let staging = staging_key();
        let staged = match self.write_staged(&staging, &data, progress).await {
            Ok(()) => self.commit(&staging, &key, &data).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            self.discard(&staging).await;
            return Err(e);
        }
        if total == 0 {
            report(progress, 1.0);
        }

        debug!(path = %key, bytes = total, "uploaded");
        Ok(metadata_for(&key, total as u64))
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.require_session()?;
        let key = object_key(path);
        if key.is_empty() {
            return Err(RemoteError::BadInput("empty path".into()));
        }
        // OpenDAL deletes are idempotent; the provider reports missing paths.
        if !self.op.exists(&key).await.map_err(map_opendal_error)? {
            return Err(RouteError::NotFound.into());
        }
        self.op.delete(&key).await.map_err(map_opendal_error)?;
        debug!(path = %key, "deleted");
        Ok(())
    }

    fn authorized_session(&self) -> Option<SessionHandle> {
        self.sessions.authorized_session()
    }

    fn invalidate_session(&self) {
        self.sessions.unlink();
    }

    fn name(&self) -> &str {
        "opendal"
    }
}

fn staging_key() -> String {
    format!("{STAGING_DIR}{}", uuid::Uuid::new_v4())
}

async fn abort_writer(writer: &mut opendal::Writer) {
    if let Err(e) = writer.abort().await {
        debug!(error = %e, "writer abort failed");
    }
}

/// Object key for a provider path: `/Photos/A.JPG` → `photos/a.jpg`
fn object_key(path: &str) -> String {
    normalize_path(path.trim_start_matches('/'))
}

/// Directory key for listing; the root is `/`.
fn dir_key(path: &str) -> String {
    let key = object_key(path);
    if key.is_empty() {
        "/".to_string()
    } else if key.ends_with('/') {
        key
    } else {
        format!("{key}/")
    }
}

fn metadata_for(key: &str, size: u64) -> FileMetadata {
    FileMetadata {
        name: key.rsplit('/').next().unwrap_or(key).to_string(),
        path_lower: Some(format!("/{key}")),
        size,
    }
}

/// Map an OpenDAL failure onto the provider error taxonomy.
pub fn map_opendal_error(e: opendal::Error) -> RemoteError {
    match e.kind() {
        ErrorKind::NotFound => RemoteError::Route(RouteError::NotFound),
        ErrorKind::PermissionDenied => RemoteError::AccessDenied(e.to_string()),
        ErrorKind::RateLimited => RemoteError::RateLimited {
            retry_after_secs: None,
        },
        ErrorKind::ConfigInvalid | ErrorKind::Unsupported => RemoteError::BadInput(e.to_string()),
        ErrorKind::IsADirectory | ErrorKind::NotADirectory => {
            RemoteError::Route(RouteError::Other(e.to_string()))
        }
        ErrorKind::Unexpected if e.is_temporary() => RemoteError::InternalServer(e.to_string()),
        _ => RemoteError::Client(e.to_string()),
    }
}
