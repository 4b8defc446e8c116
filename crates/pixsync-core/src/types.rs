use serde::{Deserialize, Serialize};

/// A listable entry in the remote store.
///
/// `path` is the provider's lower-cased canonical path. Entries without one
/// (folders, mounts) cannot be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub path: Option<String>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, path: Option<String>) -> Self {
        RemoteFile {
            name: name.into(),
            path,
        }
    }

    pub fn is_fetchable(&self) -> bool {
        self.path.is_some()
    }
}

/// Status of one in-flight upload, keyed by destination path in the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Fraction complete in [0.0, 1.0]
    Uploading { progress: f64 },
    Complete,
    Failed { message: String },
}

impl UploadStatus {
    /// `Complete` and `Failed` are the last states before the entry is removed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Complete | UploadStatus::Failed { .. })
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            UploadStatus::Uploading { progress } => Some(*progress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    Authenticated,
    Unauthenticated,
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        self == AuthState::Authenticated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    #[default]
    Png,
    Jpeg,
}

/// Bounding boxes offered by the provider's thumbnail endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    W32H32,
    W64H64,
    W128H128,
    #[default]
    W256H256,
    W480H320,
    W640H480,
    W960H640,
    W1024H768,
    W2048H1536,
}

impl ThumbnailSize {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ThumbnailSize::W32H32 => (32, 32),
            ThumbnailSize::W64H64 => (64, 64),
            ThumbnailSize::W128H128 => (128, 128),
            ThumbnailSize::W256H256 => (256, 256),
            ThumbnailSize::W480H320 => (480, 320),
            ThumbnailSize::W640H480 => (640, 480),
            ThumbnailSize::W960H640 => (960, 640),
            ThumbnailSize::W1024H768 => (1024, 768),
            ThumbnailSize::W2048H1536 => (2048, 1536),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailMode {
    /// Scale down to fit inside the box
    Strict,
    /// Scale down to fit inside the box or its transpose
    Bestfit,
    /// Scale down to cover the box or its transpose
    #[default]
    FitoneBestfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSpec {
    pub format: ThumbnailFormat,
    pub size: ThumbnailSize,
    pub mode: ThumbnailMode,
}

/// Case-normalize a remote path the way the provider does for `path_lower`.
///
/// Every cache key goes through this; a key built any other way will miss.
pub fn normalize_path(path: &str) -> String {
    path.to_lowercase()
}
