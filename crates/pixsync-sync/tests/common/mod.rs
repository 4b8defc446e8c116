//! Scripted `RemoteStore` double shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use pixsync_core::types::ThumbnailSpec;
use pixsync_core::{normalize_path, RemoteError, RouteError};
use pixsync_storage::remote::report;
use pixsync_storage::{FileMetadata, ListEntry, ProgressFn, RemoteStore, SessionHandle};

#[derive(Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub download: AtomicUsize,
    pub thumbnail: AtomicUsize,
    pub upload: AtomicUsize,
    pub delete: AtomicUsize,
}

impl Calls {
    pub fn downloads(&self) -> usize {
        self.download.load(Ordering::SeqCst)
    }

    pub fn thumbnails(&self) -> usize {
        self.thumbnail.load(Ordering::SeqCst)
    }
}

pub struct ScriptedStore {
    pub calls: Calls,
    files: Mutex<HashMap<String, Bytes>>,
    listing: Mutex<Vec<ListEntry>>,
    progress: Mutex<Vec<f64>>,
    fail_next: Mutex<Option<RemoteError>>,
    hold: Mutex<Option<Arc<Notify>>>,
    session: Mutex<Option<SessionHandle>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedStore {
            calls: Calls::default(),
            files: Mutex::new(HashMap::new()),
            listing: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            hold: Mutex::new(None),
            session: Mutex::new(Some(SessionHandle::new("acct", "token"))),
        })
    }

    pub fn unauthenticated() -> Arc<Self> {
        let store = Self::new();
        *store.session.lock().unwrap() = None;
        store
    }

    pub fn seed(&self, path: &str, data: &'static [u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(normalize_path(path), Bytes::from_static(data));
    }

    pub fn remote_contents(&self, path: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(&normalize_path(path)).cloned()
    }

    pub fn set_listing(&self, entries: Vec<ListEntry>) {
        *self.listing.lock().unwrap() = entries;
    }

    /// Fractions reported by the next transfers
    pub fn set_progress(&self, fractions: Vec<f64>) {
        *self.progress.lock().unwrap() = fractions;
    }

    pub fn fail_next(&self, err: RemoteError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Make transfers wait until the returned notify fires.
    pub fn hold_transfers(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn link(&self) {
        *self.session.lock().unwrap() = Some(SessionHandle::new("acct", "token"));
    }

    /// Every remote call fails while no session is linked.
    fn require_session(&self) -> Result<(), RemoteError> {
        match *self.session.lock().unwrap() {
            Some(_) => Ok(()),
            None => Err(RemoteError::Auth("no linked session".into())),
        }
    }

    fn take_failure(&self) -> Result<(), RemoteError> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn transfer(&self, progress: Option<&ProgressFn>) -> Result<(), RemoteError> {
        let fractions = self.progress.lock().unwrap().clone();
        for f in fractions {
            report(progress, f);
        }
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.take_failure()
    }

    fn lookup(&self, path: &str) -> Result<Bytes, RemoteError> {
        self.files
            .lock()
            .unwrap()
            .get(&normalize_path(path))
            .cloned()
            .ok_or(RemoteError::Route(RouteError::NotFound))
    }
}

fn metadata(path: &str, size: usize) -> FileMetadata {
    FileMetadata {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path_lower: Some(normalize_path(path)),
        size: size as u64,
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn list_folder(&self, _path: &str) -> Result<Vec<ListEntry>, RemoteError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.require_session()?;
        self.take_failure()?;
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn download(
        &self,
        path: &str,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        self.require_session()?;
        self.transfer(progress).await?;
        let data = self.lookup(path)?;
        Ok((metadata(path, data.len()), data))
    }

    async fn get_thumbnail(
        &self,
        path: &str,
        _spec: ThumbnailSpec,
        progress: Option<&ProgressFn>,
    ) -> Result<(FileMetadata, Bytes), RemoteError> {
        self.calls.thumbnail.fetch_add(1, Ordering::SeqCst);
        self.require_session()?;
        self.transfer(progress).await?;
        let data = self.lookup(path)?;
        let thumb = Bytes::from([b"thumb:".as_slice(), &data[..]].concat());
        Ok((metadata(path, thumb.len()), thumb))
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        progress: Option<&ProgressFn>,
    ) -> Result<FileMetadata, RemoteError> {
        self.calls.upload.fetch_add(1, Ordering::SeqCst);
        self.require_session()?;
        self.transfer(progress).await?;
        let size = data.len();
        self.files.lock().unwrap().insert(normalize_path(path), data);
        Ok(metadata(path, size))
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.require_session()?;
        self.take_failure()?;
        self.files
            .lock()
            .unwrap()
            .remove(&normalize_path(path))
            .map(|_| ())
            .ok_or(RemoteError::Route(RouteError::NotFound))
    }

    fn authorized_session(&self) -> Option<SessionHandle> {
        self.session.lock().unwrap().clone()
    }

    fn invalidate_session(&self) {
        *self.session.lock().unwrap() = None;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
