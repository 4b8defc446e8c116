use thiserror::Error;

pub type PixsyncResult<T> = Result<T, PixsyncError>;

/// Route-specific failures reported by the remote store for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Path does not exist")]
    NotFound,

    #[error("Insufficient space")]
    InsufficientSpace,

    #[error("Too many write operations")]
    TooManyWriteOperations,

    #[error("Unsupported image")]
    UnsupportedImage,

    #[error("{0}")]
    Other(String),
}

/// Failure classification of a remote store call.
///
/// `Display` yields the short human-readable description shown to users;
/// the attached detail (if any) is only for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Access Denied")]
    AccessDenied(String),

    #[error("Authentication Error")]
    Auth(String),

    #[error("Bad Input")]
    BadInput(String),

    #[error("Client Error")]
    Client(String),

    #[error("Web Error")]
    Http { status: u16, detail: String },

    #[error("Server Error")]
    InternalServer(String),

    #[error("Exceeded Rate Limit")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error(transparent)]
    Route(RouteError),
}

impl RemoteError {
    /// Underlying detail for logging (provider message, status code, ...).
    pub fn detail(&self) -> String {
        match self {
            RemoteError::AccessDenied(d)
            | RemoteError::Auth(d)
            | RemoteError::BadInput(d)
            | RemoteError::Client(d)
            | RemoteError::InternalServer(d) => d.clone(),
            RemoteError::Http { status, detail } => format!("HTTP {status}: {detail}"),
            RemoteError::RateLimited {
                retry_after_secs: Some(secs),
            } => format!("retry after {secs}s"),
            RemoteError::RateLimited { .. } => String::new(),
            RemoteError::Route(route) => route.to_string(),
        }
    }
}

impl From<RouteError> for RemoteError {
    fn from(e: RouteError) -> Self {
        RemoteError::Route(e)
    }
}

#[derive(Debug, Error)]
pub enum PixsyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PixsyncError {
    /// The description handed to the UI completion path.
    pub fn description(&self) -> String {
        self.to_string()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PixsyncError::Cancelled)
    }
}
