//! File access orchestration.
//!
//! `FileService` serves file and thumbnail bytes from the local caches when
//! it can, falls through to the remote store when it can't, and populates
//! the caches as a side effect of every successful fetch or upload. Uploads
//! are published through the `UploadTracker`; session changes through the
//! `AuthTracker`.
//!
//! Every remote call races a `CancellationToken`. Cancelling drops the
//! in-flight transfer and leaves the caches untouched.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pixsync_core::config::PixsyncConfig;
use pixsync_core::types::ThumbnailSpec;
use pixsync_core::{normalize_path, AuthState, PixsyncError, PixsyncResult, RemoteError, RemoteFile};
use pixsync_storage::{AuthOutcome, FileMetadata, ProgressFn, RemoteStore};

use crate::auth::AuthTracker;
use crate::cache::{ByteCache, CacheLimits};
use crate::uploads::UploadTracker;

/// Receives cached full-resolution bytes while a thumbnail is still loading.
pub type PreviewFn = Box<dyn FnOnce(Bytes) + Send>;

/// Per-call progress sink and cancellation.
#[derive(Default)]
pub struct TransferOptions {
    pub progress: Option<ProgressFn>,
    pub cancel: CancellationToken,
}

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub struct FileService {
    store: Arc<dyn RemoteStore>,
    files: ByteCache,
    thumbnails: ByteCache,
    auth: AuthTracker,
    uploads: Arc<UploadTracker>,
    thumbnail_spec: ThumbnailSpec,
}

impl FileService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        files: CacheLimits,
        thumbnails: CacheLimits,
        thumbnail_spec: ThumbnailSpec,
    ) -> Self {
        FileService {
            auth: AuthTracker::new(store.clone()),
            store,
            files: ByteCache::new("files", files),
            thumbnails: ByteCache::new("thumbnails", thumbnails),
            uploads: Arc::new(UploadTracker::new()),
            thumbnail_spec,
        }
    }

    pub fn from_config(store: Arc<dyn RemoteStore>, cfg: &PixsyncConfig) -> Self {
        Self::new(
            store,
            CacheLimits::files(&cfg.cache),
            CacheLimits::thumbnails(&cfg.cache),
            cfg.thumbnails,
        )
    }

    pub fn auth(&self) -> &AuthTracker {
        &self.auth
    }

    pub fn uploads(&self) -> &UploadTracker {
        &self.uploads
    }

    pub fn file_cache(&self) -> &ByteCache {
        &self.files
    }

    pub fn thumbnail_cache(&self) -> &ByteCache {
        &self.thumbnails
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.current_state()
    }

    pub fn sign_out(&self) {
        self.auth.sign_out();
    }

    pub fn handle_auth_outcome(&self, outcome: AuthOutcome) {
        self.auth.handle_auth_outcome(outcome);
    }

    /// List `folder` (`""` is the root). Listings are never cached; entries
    /// without a fetchable path are dropped.
    pub async fn list_files(
        &self,
        folder: &str,
        cancel: &CancellationToken,
    ) -> PixsyncResult<Vec<RemoteFile>> {
        let entries = cancellable(cancel, self.store.list_folder(folder))
            .await
            .inspect_err(|e| warn!(folder = %folder, error = %e, "list failed"))?;

        let files: Vec<RemoteFile> = entries
            .into_iter()
            .filter_map(|entry| {
                let path = entry.path_lower?;
                Some(RemoteFile::new(entry.name, Some(path)))
            })
            .collect();
        debug!(folder = %folder, files = files.len(), "listed");
        Ok(files)
    }

    /// Full-resolution bytes of `path`. A cache hit makes no remote call and
    /// reports no progress.
    pub async fn fetch_file(&self, path: &str, opts: TransferOptions) -> PixsyncResult<Bytes> {
        let key = normalize_path(path);
        if let Some(data) = self.files.get(&key) {
            debug!(path = %key, "file cache hit");
            return Ok(data);
        }

        debug!(path = %key, "file cache miss");
        let (_, data) = cancellable(&opts.cancel, self.store.download(path, opts.progress.as_ref()))
            .await
            .inspect_err(|e| warn!(path = %path, error = %e, "download failed"))?;
        self.files.put(&key, data.clone());
        Ok(data)
    }

    /// Thumbnail bytes of `path`.
    ///
    /// On a thumbnail cache miss, cached full-resolution bytes (if any) are
    /// handed to `preview` before the thumbnail request is issued. Only the
    /// thumbnail itself populates the thumbnail cache.
    pub async fn fetch_thumbnail(
        &self,
        path: &str,
        opts: TransferOptions,
        preview: Option<PreviewFn>,
    ) -> PixsyncResult<Bytes> {
        let key = normalize_path(path);
        if let Some(data) = self.thumbnails.get(&key) {
            debug!(path = %key, "thumbnail cache hit");
            return Ok(data);
        }

        if let Some(preview) = preview {
            if let Some(full) = self.files.get(&key) {
                debug!(path = %key, "previewing full-resolution bytes");
                preview(full);
            }
        }

        let (_, data) = cancellable(
            &opts.cancel,
            self.store
                .get_thumbnail(path, self.thumbnail_spec, opts.progress.as_ref()),
        )
        .await
        .inspect_err(|e| warn!(path = %path, error = %e, "thumbnail failed"))?;
        self.thumbnails.put(&key, data.clone());
        Ok(data)
    }

    /// Upload `data` to `path`, publishing progress through the upload
    /// tracker and relaying it to the caller's sink. On success the bytes
    /// land in the file cache before the tracker reports `Complete`.
    pub async fn upload(
        &self,
        data: Bytes,
        path: &str,
        opts: TransferOptions,
    ) -> PixsyncResult<FileMetadata> {
        self.uploads.begin(path);

        let tracker = self.uploads.clone();
        let tracked = path.to_string();
        let caller = opts.progress;
        let relay: ProgressFn = Box::new(move |fraction| {
            tracker.progress(&tracked, fraction);
            if let Some(p) = &caller {
                p(fraction);
            }
        });

        let result = cancellable(
            &opts.cancel,
            self.store.upload(path, data.clone(), Some(&relay)),
        )
        .await;

        match result {
            Ok(meta) => {
                info!(path = %path, bytes = data.len(), "upload complete");
                self.files.put(&normalize_path(path), data);
                self.uploads.complete(path);
                Ok(meta)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "upload failed");
                self.uploads.fail(path, e.description());
                Err(e)
            }
        }
    }

    /// Delete `path` remotely, then purge it from both caches. A failed
    /// delete leaves the caches as they were.
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> PixsyncResult<()> {
        cancellable(cancel, self.store.delete(path))
            .await
            .inspect_err(|e| warn!(path = %path, error = %e, "delete failed"))?;

        let key = normalize_path(path);
        self.files.remove(&key);
        self.thumbnails.remove(&key);
        info!(path = %path, "deleted");
        Ok(())
    }
}

/// Run a remote call unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> PixsyncResult<T>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PixsyncError::Cancelled),
        res = fut => res.map_err(PixsyncError::from),
    }
}
