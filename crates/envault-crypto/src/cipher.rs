//! The envelope protocol engine
//!
//! One `CipherProvider` serves a whole client: it holds the key provider
//! and builds per-object pipelines. Every call is a pure function of its
//! inputs plus fresh randomness; the master key is the only shared state
//! and it is read-only, so concurrent pipelines need no coordination.

use tracing::trace;

use envault_core::envelope::ENVELOPE_IV;
use envault_core::{Envelope, EnvaultError, EnvaultResult};

use crate::keys::{generate_data_key, generate_iv, KeyProvider};
use crate::pipeline::{CbcDecrypt, CbcEncrypt, GzipCompress, GzipDecompress, Pipeline};
use crate::wrap::{unwrap_data_key, wrap_data_key};
use crate::IV_SIZE;

/// A ready-to-use encryption pipeline plus the envelope describing it.
///
/// The caller pipes plaintext into the pipeline, ships the ciphertext, and
/// attaches the envelope as object metadata.
pub struct EncryptionCipher {
    pub envelope: Envelope,
    pub pipeline: Pipeline,
}

pub struct CipherProvider {
    key_provider: KeyProvider,
}

impl CipherProvider {
    pub fn new(key_provider: KeyProvider) -> Self {
        Self { key_provider }
    }

    pub fn key_provider(&self) -> &KeyProvider {
        &self.key_provider
    }

    /// Build the encryption side for one new object.
    ///
    /// Generates a fresh data key and IV, chains gzip compression into
    /// AES-256-CBC (compress-then-encrypt; the order is part of the wire
    /// format), wraps the data key under the master key, and assembles the
    /// envelope. The data key is dropped, and thereby zeroized, before
    /// this function returns; only its wrapped form survives.
    pub fn encryption_cipher(&self) -> EncryptionCipher {
        let data_key = generate_data_key();
        let iv = generate_iv();

        let pipeline = Pipeline::new(
            Box::new(GzipCompress::new()),
            Box::new(CbcEncrypt::new(&data_key, &iv)),
        );

        let materials = self.key_provider.encryption_materials();
        let wrapped_key = wrap_data_key(materials.key(), &data_key);
        drop(data_key);

        trace!("encryption pipeline constructed");
        EncryptionCipher {
            envelope: Envelope {
                wrapped_key,
                iv: iv.to_vec(),
                matdesc: materials.description().to_string(),
            },
            pipeline,
        }
    }

    /// Reconstruct the decryption pipeline for a previously stored object.
    ///
    /// Unwraps the data key, decodes the IV, and chains AES-256-CBC
    /// decryption into gzip decompression. A malformed envelope fails here,
    /// before any stream exists; a wrong master key yields a garbage data
    /// key silently, and the resulting pipeline reports
    /// `EnvelopeDecryptionFailed` when its first stage checks trip.
    pub fn decryption_cipher(&self, envelope: &Envelope) -> EnvaultResult<Pipeline> {
        let data_key = unwrap_data_key(self.key_provider.key(), &envelope.wrapped_key)?;
        let iv: [u8; IV_SIZE] = envelope
            .iv
            .as_slice()
            .try_into()
            .map_err(|_| EnvaultError::EnvelopeMalformed { field: ENVELOPE_IV })?;

        trace!("decryption pipeline constructed");
        Ok(Pipeline::new_for_decryption(
            Box::new(CbcDecrypt::new(&data_key, &iv)),
            Box::new(GzipDecompress::new()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pump;
    use proptest::prelude::*;

    fn provider(key: Vec<u8>) -> CipherProvider {
        CipherProvider::new(KeyProvider::new(key).unwrap())
    }

    async fn encrypt(provider: &CipherProvider, plain: &[u8]) -> (Envelope, Vec<u8>) {
        let EncryptionCipher { envelope, pipeline } = provider.encryption_cipher();
        let mut ciphertext = Vec::new();
        pump(pipeline, plain, &mut ciphertext).await.unwrap();
        (envelope, ciphertext)
    }

    async fn decrypt(
        provider: &CipherProvider,
        envelope: &Envelope,
        ciphertext: &[u8],
    ) -> EnvaultResult<Vec<u8>> {
        let pipeline = provider.decryption_cipher(envelope)?;
        let mut out = Vec::new();
        pump(pipeline, ciphertext, &mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_hello_world_roundtrip_zero_master_key() {
        let p = provider(vec![0u8; 32]);
        let (envelope, ciphertext) = encrypt(&p, b"hello world").await;

        let meta = envelope.to_metadata();
        assert_eq!(meta.len(), 3);
        assert!(meta.values().all(|v| !v.is_empty()));

        let restored = decrypt(&p, &envelope, &ciphertext).await.unwrap();
        assert_eq!(restored, b"hello world");
    }

    #[tokio::test]
    async fn test_roundtrip_all_master_key_sizes() {
        for len in [16, 24, 32] {
            let p = provider(vec![0x5A; len]);
            let plain = b"a body long enough to span several cipher blocks....".to_vec();
            let (envelope, ciphertext) = encrypt(&p, &plain).await;
            let restored = decrypt(&p, &envelope, &ciphertext).await.unwrap();
            assert_eq!(restored, plain, "master key len {len}");
        }
    }

    #[tokio::test]
    async fn test_empty_plaintext_roundtrip() {
        let p = provider(vec![3u8; 24]);
        let (envelope, ciphertext) = encrypt(&p, b"").await;
        assert!(!ciphertext.is_empty(), "gzip trailer + padding still flow");
        let restored = decrypt(&p, &envelope, &ciphertext).await.unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_master_key_never_succeeds_silently() {
        let p1 = provider(vec![1u8; 32]);
        let p2 = provider(vec![2u8; 32]);
        let (envelope, ciphertext) = encrypt(&p1, b"top secret body").await;

        let result = decrypt(&p2, &envelope, &ciphertext).await;
        match result {
            Err(EnvaultError::EnvelopeDecryptionFailed) => {}
            Err(other) => panic!("expected EnvelopeDecryptionFailed, got: {other}"),
            Ok(out) => panic!("wrong key silently produced {} bytes", out.len()),
        }
    }

    #[test]
    fn test_envelopes_never_repeat_key_or_iv() {
        let p = provider(vec![0u8; 32]);
        let mut seen_keys = std::collections::HashSet::new();
        let mut seen_ivs = std::collections::HashSet::new();
        for _ in 0..64 {
            let EncryptionCipher { envelope, .. } = p.encryption_cipher();
            assert!(seen_keys.insert(envelope.wrapped_key.clone()));
            assert!(seen_ivs.insert(envelope.iv.clone()));
        }
    }

    #[test]
    fn test_envelope_carries_materials_description() {
        let kp = KeyProvider::with_description(vec![0u8; 16], r#"{"tenant":"a"}"#).unwrap();
        let p = CipherProvider::new(kp);
        let EncryptionCipher { envelope, .. } = p.encryption_cipher();
        assert_eq!(envelope.matdesc, r#"{"tenant":"a"}"#);
    }

    #[tokio::test]
    async fn test_bad_iv_length_is_malformed() {
        let p = provider(vec![0u8; 32]);
        let (mut envelope, _) = encrypt(&p, b"x").await;
        envelope.iv.truncate(8);
        let err = p.decryption_cipher(&envelope).unwrap_err();
        assert!(matches!(err, EnvaultError::EnvelopeMalformed { .. }));
    }

    #[tokio::test]
    async fn test_large_body_chunked_roundtrip() {
        // 2 MiB of non-repeating bytes, driven through in pump-sized chunks
        let p = provider(vec![0u8; 32]);
        let plain: Vec<u8> = (0..2 * 1024 * 1024u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let (envelope, ciphertext) = encrypt(&p, &plain).await;
        let restored = decrypt(&p, &envelope, &ciphertext).await.unwrap();
        assert_eq!(restored, plain);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_roundtrip_fidelity(plain in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let p = provider(vec![0xC3; 32]);
                let (envelope, ciphertext) = encrypt(&p, &plain).await;
                let restored = decrypt(&p, &envelope, &ciphertext).await.unwrap();
                assert_eq!(restored, plain);
            });
        }
    }
}
