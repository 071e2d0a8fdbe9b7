use thiserror::Error;

pub type EnvaultResult<T> = Result<T, EnvaultError>;

/// Error taxonomy for the envelope-encryption stack.
///
/// Construction-time validation failures (`InvalidKeyLength`,
/// `InvalidDescription`, `EnvelopeMalformed`) are raised synchronously,
/// before any stream exists. Pipeline failures are terminal; no retry
/// happens below the caller. Error payloads never carry key material.
#[derive(Debug, Error)]
pub enum EnvaultError {
    #[error("invalid key, symmetric key expected to have 16, 24 or 32 bytes, saw length: {len}")]
    InvalidKeyLength { len: usize },

    #[error("materials description is not a valid JSON document")]
    InvalidDescription(#[source] serde_json::Error),

    #[error("envelope metadata malformed: field `{field}` missing or undecodable")]
    EnvelopeMalformed { field: &'static str },

    #[error("envelope decryption failed: wrapped key does not unwrap under this master key")]
    EnvelopeDecryptionFailed,

    #[error("pipeline transform error: {0}")]
    PipelineTransform(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
