//! OpenDAL Operator factory for envault storage backends

use anyhow::{Context, Result};
use opendal::Operator;

use envault_core::config::StorageConfig;

/// Build an OpenDAL Operator for one bucket of an S3-compatible endpoint.
///
/// Uses path-style addressing (default in opendal 0.55), which is what
/// MinIO and most self-hosted S3 implementations expect.
///
/// If `enforce_tls` is set and the endpoint uses HTTP, this returns an
/// error. Otherwise a warning is logged for non-HTTPS endpoints.
pub fn build_operator(cfg: &StorageConfig, bucket: &str) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            );
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP. Credentials are transmitted unencrypted; \
             set storage.enforce_tls = true and use HTTPS in production."
        );
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

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
