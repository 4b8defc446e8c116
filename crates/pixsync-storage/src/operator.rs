//! OpenDAL Operator factory for pixsync storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

use pixsync_core::config::{StorageBackend, StorageConfig};

/// S3 access keys (only needed for the s3 backend)
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

/// Build an OpenDAL Operator for the configured backend.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_operator(storage: &StorageConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    let op = match storage.backend {
        StorageBackend::Memory => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
        StorageBackend::Fs => {
            let builder = opendal::services::Fs::default().root(&storage.root);
            Operator::new(builder)
                .with_context(|| format!("creating OpenDAL fs operator at {}", storage.root))?
                .finish()
        }
        StorageBackend::S3 => {
            let creds = creds.context("s3 backend requires access credentials")?;
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
                );
            }
            // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
            let builder = opendal::services::S3::default()
                .endpoint(&storage.endpoint)
                .region(&storage.region)
                .bucket(&storage.bucket)
                .root(&storage.root)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(creds.secret_access_key.expose_secret());
            Operator::new(builder)
                .context("creating OpenDAL S3 operator")?
                .finish()
        }
    };

    Ok(op
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        ))
}
