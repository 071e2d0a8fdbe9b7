//! The encryption client: streaming upload/download plus the
//! decrypted-copy orchestrator behind presigned URLs.
//!
//! Objects live encrypted in one bucket; on-demand decrypted copies live
//! in a second. The envelope travels as S3 user metadata when the backend
//! supports it, and as a small sidecar object otherwise (the Memory
//! backend used in tests, for one). Either way the object's bytes are
//! opaque ciphertext.

use std::collections::HashMap;
use std::time::Duration;

use opendal::{ErrorKind, Operator};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::compat::{FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt};
use tracing::{debug, info};

use envault_core::config::{EncryptionConfig, EnvaultConfig};
use envault_core::{Envelope, EnvaultError, EnvaultResult};
use envault_crypto::cipher::{CipherProvider, EncryptionCipher};
use envault_crypto::keys::KeyProvider;
use envault_crypto::pipeline::pump;

use crate::operator::build_operator;

const ENVELOPE_SIDECAR_SUFFIX: &str = ".envelope";

/// Outcome of one encrypted upload.
#[derive(Debug)]
pub struct UploadSummary {
    pub key: String,
    pub plaintext_bytes: u64,
    pub ciphertext_bytes: u64,
}

pub struct EncryptionClient {
    encrypted: Operator,
    decrypted: Operator,
    cipher: CipherProvider,
}

impl EncryptionClient {
    /// Build a client over pre-built operators. The master key is
    /// validated here; a bad key never reaches a pipeline.
    pub fn new(
        encrypted: Operator,
        decrypted: Operator,
        master_key: Vec<u8>,
        encryption: &EncryptionConfig,
    ) -> EnvaultResult<Self> {
        let key_provider =
            KeyProvider::with_description(master_key, &encryption.materials_description)?;
        Ok(Self {
            encrypted,
            decrypted,
            cipher: CipherProvider::new(key_provider),
        })
    }

    /// Build a client and both bucket operators from config.
    pub fn from_config(cfg: &EnvaultConfig, master_key: Vec<u8>) -> EnvaultResult<Self> {
        let encrypted = build_operator(&cfg.storage, &cfg.storage.encrypted_bucket)?;
        let decrypted = build_operator(&cfg.storage, &cfg.storage.decrypted_bucket)?;
        Self::new(encrypted, decrypted, master_key, &cfg.encryption)
    }

    /// Compress, encrypt and upload one object, attaching its envelope.
    ///
    /// Plaintext is streamed through the pipeline chunk by chunk; a failed
    /// transform drops the storage writer, which aborts the uncommitted
    /// upload.
    pub async fn upload<R>(&self, key: &str, reader: R) -> EnvaultResult<UploadSummary>
    where
        R: AsyncRead + Unpin,
    {
        let EncryptionCipher { envelope, pipeline } = self.cipher.encryption_cipher();
        let meta = envelope.to_metadata();
        let inline = self.inline_metadata();

        let writer = if inline {
            self.encrypted
                .writer_with(key)
                .user_metadata(meta.clone())
                .await
        } else {
            self.encrypted.writer(key).await
        }
        .map_err(storage_err)?;

        let mut sink = writer.into_futures_async_write().compat_write();
        let (plaintext_bytes, ciphertext_bytes) = pump(pipeline, reader, &mut sink).await?;
        sink.shutdown().await?;

        if !inline {
            let doc = serde_json::to_vec(&meta).map_err(|e| EnvaultError::Other(e.into()))?;
            self.encrypted
                .write(&sidecar_key(key), doc)
                .await
                .map_err(storage_err)?;
        }

        debug!(key, plaintext_bytes, ciphertext_bytes, "uploaded encrypted object");
        Ok(UploadSummary {
            key: key.to_string(),
            plaintext_bytes,
            ciphertext_bytes,
        })
    }

    /// Download one object, decrypting and decompressing into `writer`.
    pub async fn download<W>(&self, key: &str, writer: &mut W) -> EnvaultResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let (envelope, ciphertext_len) = self.fetch_envelope(key).await?;
        let pipeline = self.cipher.decryption_cipher(&envelope)?;

        let reader = self.encrypted.reader(key).await.map_err(storage_err)?;
        let reader = reader
            .into_futures_async_read(0..ciphertext_len)
            .await
            .map_err(storage_err)?
            .compat();

        let (_, plaintext_bytes) = pump(pipeline, reader, writer).await?;
        debug!(key, plaintext_bytes, "downloaded and decrypted object");
        Ok(plaintext_bytes)
    }

    /// Presign a URL for the decrypted copy of `key`, materializing that
    /// copy first if it does not exist yet.
    pub async fn presigned_url(&self, key: &str, expires: Duration) -> EnvaultResult<String> {
        if !self.decrypted.exists(key).await.map_err(storage_err)? {
            self.materialize_decrypted(key).await?;
        }
        let request = self
            .decrypted
            .presign_read(key, expires)
            .await
            .map_err(storage_err)?;
        Ok(request.uri().to_string())
    }

    /// Decrypt `key` from the encrypted bucket straight into the decrypted
    /// bucket as one coordinated transfer: the decryption pipeline's
    /// output is the upload's input, each chunk write is awaited before
    /// the next read, and a failure at either end drops both handles
    /// (aborting the uncommitted upload).
    pub async fn materialize_decrypted(&self, key: &str) -> EnvaultResult<u64> {
        let writer = self.decrypted.writer(key).await.map_err(storage_err)?;
        let mut sink = writer.into_futures_async_write().compat_write();
        let bytes = self.download(key, &mut sink).await?;
        sink.shutdown().await?;
        info!(key, bytes, "materialized decrypted copy");
        Ok(bytes)
    }

    /// Fetch and parse the envelope for `key`, plus the ciphertext length.
    async fn fetch_envelope(&self, key: &str) -> EnvaultResult<(Envelope, u64)> {
        let stat = self.encrypted.stat(key).await.map_err(storage_err)?;
        let ciphertext_len = stat.content_length();

        let envelope = if self.inline_metadata() {
            let empty = HashMap::new();
            Envelope::from_metadata(stat.user_metadata().unwrap_or(&empty))?
        } else {
            let raw = self
                .encrypted
                .read(&sidecar_key(key))
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::NotFound => EnvaultError::EnvelopeMalformed { field: "envelope" },
                    _ => storage_err(e),
                })?;
            let meta: HashMap<String, String> = serde_json::from_slice(&raw.to_bytes())
                .map_err(|_| EnvaultError::EnvelopeMalformed { field: "envelope" })?;
            Envelope::from_metadata(&meta)?
        };

        Ok((envelope, ciphertext_len))
    }

    fn inline_metadata(&self) -> bool {
        self.encrypted
            .info()
            .full_capability()
            .write_with_user_metadata
    }
}

fn sidecar_key(key: &str) -> String {
    format!("{key}{ENVELOPE_SIDECAR_SUFFIX}")
}

fn storage_err(e: opendal::Error) -> EnvaultError {
    EnvaultError::Storage(e.to_string())
}
