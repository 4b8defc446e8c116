//! pixsync-storage: remote store seam, OpenDAL backend, and session lifecycle

pub mod health;
pub mod operator;
pub mod remote;
pub mod session;
pub mod store;
pub mod thumbnail;

pub use health::check_health;
pub use operator::{build_operator, S3Credentials};
pub use remote::{FileMetadata, ListEntry, ProgressFn, RemoteStore};
pub use session::{AuthOutcome, SessionHandle, SessionManager};
pub use store::OpendalStore;
