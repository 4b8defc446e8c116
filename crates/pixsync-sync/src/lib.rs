//! pixsync-sync: the file service layer between the remote store, the local
//! caches, and any number of independent UI observers.

pub mod auth;
pub mod cache;
pub mod registry;
pub mod service;
pub mod uploads;

pub use auth::AuthTracker;
pub use cache::{ByteCache, CacheLimits};
pub use registry::{Listener, ListenerHandle, ListenerRegistry};
pub use service::{FileService, PreviewFn, TransferOptions};
pub use uploads::{UploadSnapshot, UploadTracker};
