//! OAuth session lifecycle.
//!
//! A `SessionManager` owns the (at most one) linked account session. The
//! authorization flow is the OAuth2 implicit grant: the user is sent to
//! `authorize_url()`, and the provider redirects back to the registered
//! redirect URI with either `access_token=...` or `error=...` in the
//! fragment. `handle_redirect_url` classifies that redirect.
//!
//! When a session file is configured the session is persisted as JSON
//! (written atomically via temp + rename) and reloaded on startup.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use pixsync_core::config::AuthConfig;

/// Result of an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    /// The user declined access
    Cancel,
    Error { description: String },
}

/// Opaque proof of a linked account.
#[derive(Clone)]
pub struct SessionHandle {
    account_id: String,
    token: Arc<SecretString>,
}

impl SessionHandle {
    pub fn new(account_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        SessionHandle {
            account_id: account_id.into(),
            token: Arc::new(SecretString::from(access_token.into())),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn access_token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("account_id", &self.account_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// On-disk form of a linked session
#[derive(Serialize, Deserialize)]
struct StoredSession {
    account_id: String,
    access_token: String,
}

pub struct SessionManager {
    app_key: String,
    authorize_endpoint: String,
    redirect_uri: String,
    session_file: Option<PathBuf>,
    current: RwLock<Option<SessionHandle>>,
    /// CSRF `state` of the most recent authorization request
    pending_state: Mutex<Option<String>>,
}

impl SessionManager {
    /// Create a manager with no linked session (nothing is read from disk).
    pub fn new(cfg: &AuthConfig) -> Self {
        SessionManager {
            app_key: cfg.app_key.clone(),
            authorize_endpoint: cfg.authorize_url.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            session_file: cfg.session_file.clone(),
            current: RwLock::new(None),
            pending_state: Mutex::new(None),
        }
    }

    /// Create a manager and restore a previously persisted session, if any.
    pub fn load(cfg: &AuthConfig) -> Result<Self> {
        let manager = Self::new(cfg);
        if let Some(path) = manager.session_file.as_deref() {
            if let Some(handle) = read_session_file(path)? {
                debug!(account = %handle.account_id(), "session restored");
                *manager.current.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
        }
        Ok(manager)
    }

    pub fn authorized_session(&self) -> Option<SessionHandle> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `handle` as the live session and persist it if configured.
    pub fn link(&self, handle: SessionHandle) -> Result<()> {
        if let Some(path) = self.session_file.as_deref() {
            write_session_file(path, &handle)?;
        }
        info!(account = %handle.account_id(), "session linked");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Drop the live session and its persisted copy. Safe to call when unlinked.
    pub fn unlink(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(path) = self.session_file.as_deref() {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), "failed to remove session file: {e}");
                }
            }
        }
        match previous {
            Some(handle) => info!(account = %handle.account_id(), "session unlinked"),
            None => debug!("unlink requested with no live session"),
        }
    }

    /// Build the URL the user opens to authorize this app.
    ///
    /// Each call issues a fresh `state` value; only the most recent one is
    /// accepted by `handle_redirect_url`.
    pub fn authorize_url(&self) -> Result<String> {
        let state = uuid::Uuid::new_v4().to_string();
        let url = Url::parse_with_params(
            &self.authorize_endpoint,
            &[
                ("client_id", self.app_key.as_str()),
                ("response_type", "token"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        )
        .with_context(|| format!("invalid authorize endpoint: {}", self.authorize_endpoint))?;
        *self
            .pending_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(state);
        Ok(url.into())
    }

    /// Classify an authorization redirect.
    ///
    /// Returns `None` when `raw` is not addressed to our redirect URI. On
    /// success the new session is linked before returning.
    pub fn handle_redirect_url(&self, raw: &str) -> Option<AuthOutcome> {
        let expected_uri = Url::parse(&self.redirect_uri).ok()?;
        let url = Url::parse(raw).ok()?;
        if !same_endpoint(&url, &expected_uri) {
            return None;
        }

        // Implicit grant puts parameters in the fragment; accept the query too.
        let encoded = url.fragment().or_else(|| url.query()).unwrap_or("");
        let params: HashMap<String, String> = url::form_urlencoded::parse(encoded.as_bytes())
            .into_owned()
            .collect();

        let expected = self
            .pending_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Without a pending request (login finished in another process)
        // there is nothing to compare against.
        if let Some(expected) = expected.as_deref() {
            if params.get("state").map(String::as_str) != Some(expected) {
                warn!("authorization redirect state mismatch");
                return Some(AuthOutcome::Error {
                    description: "state mismatch".into(),
                });
            }
        }

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Some(AuthOutcome::Cancel);
            }
            let description = params
                .get("error_description")
                .cloned()
                .unwrap_or_else(|| error.clone());
            return Some(AuthOutcome::Error { description });
        }

        let Some(token) = params.get("access_token") else {
            return Some(AuthOutcome::Error {
                description: "missing access token".into(),
            });
        };
        let account_id = params
            .get("account_id")
            .or_else(|| params.get("uid"))
            .cloned()
            .unwrap_or_default();

        match self.link(SessionHandle::new(account_id, token.clone())) {
            Ok(()) => Some(AuthOutcome::Success),
            Err(e) => Some(AuthOutcome::Error {
                description: format!("{e:#}"),
            }),
        }
    }
}

/// Scheme, host, port and path must all match exactly.
fn same_endpoint(url: &Url, expected: &Url) -> bool {
    url.scheme() == expected.scheme()
        && url.host_str() == expected.host_str()
        && url.port_or_known_default() == expected.port_or_known_default()
        && url.path() == expected.path()
}

fn read_session_file(path: &Path) -> Result<Option<SessionHandle>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file: {}", path.display()))?;
    let stored: StoredSession = serde_json::from_str(&content)
        .with_context(|| format!("parsing session file: {}", path.display()))?;
    Ok(Some(SessionHandle::new(stored.account_id, stored.access_token)))
}

fn write_session_file(path: &Path, handle: &SessionHandle) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating session dir: {}", parent.display()))?;
    }
    let json = serde_json::to_string(&StoredSession {
        account_id: handle.account_id().to_string(),
        access_token: handle.access_token().to_string(),
    })
    .context("serializing session")?;

    // Atomic write: write to temp file, then rename
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("writing session temp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming session file: {}", path.display()))?;
    Ok(())
}
