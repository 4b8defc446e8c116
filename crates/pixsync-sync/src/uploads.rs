//! Live, path-indexed view of uploads in flight.
//!
//! Per path: (absent) → Uploading(0) → Uploading(p)… → Complete | Failed →
//! (absent). The terminal state is published once, then the entry is
//! removed and the map published again. Nothing is retained afterwards.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use pixsync_core::UploadStatus;

use crate::registry::{ListenerHandle, ListenerRegistry};

/// Every upload currently tracked, keyed by destination path.
pub type UploadSnapshot = BTreeMap<String, UploadStatus>;

#[derive(Default)]
pub struct UploadTracker {
    statuses: Mutex<UploadSnapshot>,
    listeners: ListenerRegistry<UploadSnapshot>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, path: &str) {
        debug!(path = %path, "upload started");
        self.set(path, UploadStatus::Uploading { progress: 0.0 });
    }

    /// Record a progress fraction. A value equal to the current one is not
    /// republished.
    pub fn progress(&self, path: &str, fraction: f64) {
        let status = UploadStatus::Uploading { progress: fraction };
        if self.status(path).as_ref() == Some(&status) {
            return;
        }
        self.set(path, status);
    }

    pub fn complete(&self, path: &str) {
        debug!(path = %path, "upload complete");
        self.finish(path, UploadStatus::Complete);
    }

    pub fn fail(&self, path: &str, message: impl Into<String>) {
        let message = message.into();
        debug!(path = %path, error = %message, "upload failed");
        self.finish(path, UploadStatus::Failed { message });
    }

    pub fn status(&self, path: &str) -> Option<UploadStatus> {
        self.lock().get(path).cloned()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.lock().clone()
    }

    /// Subscribe to the whole in-flight map. No replay on subscribe.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&UploadSnapshot) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.listeners.unsubscribe(handle);
    }

    fn finish(&self, path: &str, terminal: UploadStatus) {
        self.set(path, terminal);
        let snapshot = {
            let mut statuses = self.lock();
            statuses.remove(path);
            statuses.clone()
        };
        self.listeners.notify_all(&snapshot);
    }

    fn set(&self, path: &str, status: UploadStatus) {
        let snapshot = {
            let mut statuses = self.lock();
            statuses.insert(path.to_string(), status);
            statuses.clone()
        };
        self.listeners.notify_all(&snapshot);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UploadSnapshot> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
