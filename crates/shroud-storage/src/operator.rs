//! OpenDAL Operator factory for the gateway's S3 backend

use anyhow::{Context, Result};
use opendal::Operator;
use secrecy::ExposeSecret;
use shroud_core::config::StorageConfig;

/// Build an OpenDAL Operator for any S3-compatible endpoint (MinIO,
/// SeaweedFS, ...).
///
/// The config carries a bare `host:port`; `use_ssl` picks the scheme.
/// Path-style addressing (the opendal default) is required by MinIO and
/// SeaweedFS — do NOT call enable_virtual_host_style() for these.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let scheme = if cfg.use_ssl { "https" } else { "http" };
    let endpoint = format!("{scheme}://{}", cfg.endpoint);

    if !cfg.use_ssl {
        tracing::warn!(
            endpoint = %endpoint,
            "object store endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    let builder = opendal::services::S3::default()
        .endpoint(&endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(cfg.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_operator_valid() {
        let cfg = StorageConfig {
            endpoint: "localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string().into(),
            use_ssl: false,
        };
        assert!(build_operator(&cfg).is_ok());
    }

    #[test]
    fn build_operator_https() {
        let cfg = StorageConfig {
            endpoint: "s3.example.com".to_string(),
            use_ssl: true,
            ..Default::default()
        };
        assert!(build_operator(&cfg).is_ok());
    }
}
