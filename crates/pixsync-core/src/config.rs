use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ThumbnailSpec;

/// Top-level configuration (loaded from pixsync.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PixsyncConfig {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub thumbnails: ThumbnailSpec,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which OpenDAL service to build
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory inside the bucket (s3) or on disk (fs)
    pub root: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Transfer slice size in KiB; one progress event is emitted per slice
    pub transfer_chunk_kib: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client id registered with the provider
    pub app_key: String,
    /// Provider authorization endpoint
    pub authorize_url: String,
    /// Redirect URI registered for this app
    pub redirect_uri: String,
    /// Where the linked session is persisted (none = memory only)
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the full-resolution cache in MB
    pub files_max_mb: u64,
    /// Capacity of the thumbnail cache in MB
    pub thumbnails_max_mb: u64,
    /// Maximum entries per cache (0 = unlimited)
    pub max_entries: usize,
    /// Entry lifetime in seconds (0 = no expiry)
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "pixsync".into(),
            root: "/".into(),
            enforce_tls: false,
            transfer_chunk_kib: 256,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            authorize_url: "https://www.dropbox.com/oauth2/authorize".into(),
            redirect_uri: "pixsync://oauth2/callback".into(),
            session_file: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            files_max_mb: 256,
            thumbnails_max_mb: 32,
            max_entries: 0,
            ttl_secs: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ThumbnailFormat, ThumbnailMode, ThumbnailSize};

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
backend = "fs"
root = "/srv/photos"
transfer_chunk_kib = 64

[auth]
app_key = "abc123"
redirect_uri = "db-abc123://2/token"
session_file = "/tmp/pixsync-session.json"

[cache]
files_max_mb = 512
thumbnails_max_mb = 64
max_entries = 1000
ttl_secs = 3600

[thumbnails]
format = "jpeg"
size = "w640h480"
mode = "bestfit"

[log]
level = "debug"
format = "json"
"#;
        let config: PixsyncConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.storage.root, "/srv/photos");
        assert_eq!(config.storage.transfer_chunk_kib, 64);
        assert_eq!(config.auth.app_key, "abc123");
        assert_eq!(
            config.auth.session_file,
            Some(PathBuf::from("/tmp/pixsync-session.json"))
        );
        assert_eq!(config.cache.files_max_mb, 512);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.thumbnails.format, ThumbnailFormat::Jpeg);
        assert_eq!(config.thumbnails.size, ThumbnailSize::W640H480);
        assert_eq!(config.thumbnails.mode, ThumbnailMode::Bestfit);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: PixsyncConfig = toml::from_str("").unwrap();

        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.region, "us-east-1");
        assert!(!config.storage.enforce_tls);
        assert_eq!(config.cache.files_max_mb, 256);
        assert_eq!(config.cache.ttl(), None);
        assert_eq!(config.thumbnails, ThumbnailSpec::default());
        assert!(config.auth.session_file.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[thumbnails]
size = "w128h128"
"#;
        let config: PixsyncConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.thumbnails.size, ThumbnailSize::W128H128);
        // Defaults
        assert_eq!(config.thumbnails.format, ThumbnailFormat::Png);
        assert_eq!(config.thumbnails.mode, ThumbnailMode::FitoneBestfit);
        assert_eq!(config.storage.bucket, "pixsync");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = PixsyncConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PixsyncConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(config.auth.redirect_uri, parsed.auth.redirect_uri);
        assert_eq!(config.thumbnails, parsed.thumbnails);
    }
}
