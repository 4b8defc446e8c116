pub mod config;
pub mod error;
pub mod types;

pub use error::{PixsyncError, PixsyncResult, RemoteError, RouteError};
pub use types::{normalize_path, AuthState, RemoteFile, UploadStatus};
