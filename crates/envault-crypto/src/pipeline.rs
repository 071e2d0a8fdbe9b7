//! Two-stage streaming transform pipeline
//!
//! Encrypt direction: gzip compress → AES-256-CBC encrypt.
//! Decrypt direction: AES-256-CBC decrypt → gzip decompress.
//!
//! Each stage is a [`Transform`] fed incrementally with `update` and
//! drained with `finish`; [`Pipeline`] chains exactly two of them. The
//! stages carry at most one cipher block plus the current update chunk, so
//! memory stays flat regardless of object size. CBC chaining is inherently
//! sequential: bytes flow through in arrival order and no intra-object
//! parallelism is attempted.
//!
//! A failure in either stage is terminal for the whole chain. Output
//! already emitted before the failure is not retracted; cleanup of the
//! destination belongs to the caller.

use std::io::Write;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use envault_core::{EnvaultError, EnvaultResult};

use crate::keys::DataKey;
use crate::{BLOCK_SIZE, IV_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Read granularity of the async pipeline driver.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// One stage of a pipeline: accepts bytes incrementally, emits transformed
/// bytes, and flushes its tail on `finish`.
pub trait Transform: Send {
    fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>>;
    fn finish(self: Box<Self>) -> EnvaultResult<Vec<u8>>;
}

/// Streaming gzip compressor stage.
pub struct GzipCompress {
    encoder: GzEncoder<Vec<u8>>,
}

impl GzipCompress {
    pub fn new() -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }
}

impl Default for GzipCompress {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GzipCompress {
    fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>> {
        self.encoder
            .write_all(input)
            .map_err(|e| EnvaultError::PipelineTransform(format!("gzip compress: {e}")))?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }

    fn finish(self: Box<Self>) -> EnvaultResult<Vec<u8>> {
        self.encoder
            .finish()
            .map_err(|e| EnvaultError::PipelineTransform(format!("gzip finish: {e}")))
    }
}

/// Streaming gzip decompressor stage.
pub struct GzipDecompress {
    decoder: GzDecoder<Vec<u8>>,
}

impl GzipDecompress {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
        }
    }
}

impl Default for GzipDecompress {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GzipDecompress {
    fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>> {
        self.decoder
            .write_all(input)
            .map_err(|e| EnvaultError::PipelineTransform(format!("gzip decompress: {e}")))?;
        Ok(std::mem::take(self.decoder.get_mut()))
    }

    fn finish(mut self: Box<Self>) -> EnvaultResult<Vec<u8>> {
        // try_finish drives the remaining buffered input through the
        // decoder and fails on a truncated or corrupt stream
        self.decoder
            .try_finish()
            .map_err(|e| EnvaultError::PipelineTransform(format!("gzip finish: {e}")))?;
        self.decoder
            .finish()
            .map_err(|e| EnvaultError::PipelineTransform(format!("gzip finish: {e}")))
    }
}

/// AES-256-CBC encryptor stage (PKCS#7 on the final block).
///
/// Carries the sub-block remainder between updates; everything else is
/// encrypted and emitted as soon as a full block is available.
pub struct CbcEncrypt {
    cipher: Aes256CbcEnc,
    carry: Vec<u8>,
}

impl CbcEncrypt {
    pub fn new(key: &DataKey, iv: &[u8; IV_SIZE]) -> Self {
        Self {
            cipher: Aes256CbcEnc::new(key.as_bytes().into(), iv.into()),
            carry: Vec::with_capacity(BLOCK_SIZE),
        }
    }
}

impl Transform for CbcEncrypt {
    fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>> {
        self.carry.extend_from_slice(input);
        let whole = self.carry.len() - self.carry.len() % BLOCK_SIZE;
        let mut out: Vec<u8> = self.carry.drain(..whole).collect();
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }

    fn finish(self: Box<Self>) -> EnvaultResult<Vec<u8>> {
        // carry is < one block; padding always emits exactly one block
        let me = *self;
        Ok(me.cipher.encrypt_padded_vec_mut::<Pkcs7>(&me.carry))
    }
}

/// AES-256-CBC decryptor stage.
///
/// Withholds the trailing full block (plus any sub-block remainder) so the
/// PKCS#7 padding can be stripped once the stream ends.
pub struct CbcDecrypt {
    cipher: Aes256CbcDec,
    carry: Vec<u8>,
}

impl CbcDecrypt {
    pub fn new(key: &DataKey, iv: &[u8; IV_SIZE]) -> Self {
        Self {
            cipher: Aes256CbcDec::new(key.as_bytes().into(), iv.into()),
            carry: Vec::with_capacity(2 * BLOCK_SIZE),
        }
    }
}

impl Transform for CbcDecrypt {
    fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>> {
        self.carry.extend_from_slice(input);
        let withhold = BLOCK_SIZE + self.carry.len() % BLOCK_SIZE;
        if self.carry.len() <= withhold {
            return Ok(Vec::new());
        }
        let whole = self.carry.len() - withhold;
        let mut out: Vec<u8> = self.carry.drain(..whole).collect();
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }

    fn finish(self: Box<Self>) -> EnvaultResult<Vec<u8>> {
        let me = *self;
        if me.carry.len() != BLOCK_SIZE {
            return Err(EnvaultError::PipelineTransform(format!(
                "ciphertext truncated: {} trailing bytes, expected one {BLOCK_SIZE}-byte block",
                me.carry.len()
            )));
        }
        me.cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&me.carry)
            .map_err(|_| {
                EnvaultError::PipelineTransform("PKCS#7 padding check failed".to_string())
            })
    }
}

/// A fixed two-stage chain: stage one's output feeds stage two.
///
/// `update` pushes a chunk through both stages; `finish` drains both tails
/// in order. Either stage's failure is the chain's single terminal error.
pub struct Pipeline {
    first: Box<dyn Transform>,
    second: Box<dyn Transform>,
    emitted: u64,
    unwrap_sensitive: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("emitted", &self.emitted)
            .field("unwrap_sensitive", &self.unwrap_sensitive)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(first: Box<dyn Transform>, second: Box<dyn Transform>) -> Self {
        Self {
            first,
            second,
            emitted: 0,
            unwrap_sensitive: false,
        }
    }

    /// Like [`Pipeline::new`], but a stage failure before the first output
    /// byte is reported as `EnvelopeDecryptionFailed`: garbage from a
    /// wrong-key unwrap trips the cipher padding or gzip header checks
    /// immediately, before any plaintext has flowed.
    pub fn new_for_decryption(first: Box<dyn Transform>, second: Box<dyn Transform>) -> Self {
        Self {
            first,
            second,
            emitted: 0,
            unwrap_sensitive: true,
        }
    }

    pub fn update(&mut self, input: &[u8]) -> EnvaultResult<Vec<u8>> {
        let mid = self
            .first
            .update(input)
            .map_err(|e| classify(self.unwrap_sensitive, self.emitted, e))?;
        let out = self
            .second
            .update(&mid)
            .map_err(|e| classify(self.unwrap_sensitive, self.emitted, e))?;
        self.emitted += out.len() as u64;
        Ok(out)
    }

    pub fn finish(self) -> EnvaultResult<Vec<u8>> {
        let Self {
            first,
            mut second,
            mut emitted,
            unwrap_sensitive,
        } = self;

        let mid = first
            .finish()
            .map_err(|e| classify(unwrap_sensitive, emitted, e))?;
        let mut out = second
            .update(&mid)
            .map_err(|e| classify(unwrap_sensitive, emitted, e))?;
        emitted += out.len() as u64;
        let tail = second
            .finish()
            .map_err(|e| classify(unwrap_sensitive, emitted, e))?;
        out.extend_from_slice(&tail);
        Ok(out)
    }
}

fn classify(unwrap_sensitive: bool, emitted: u64, err: EnvaultError) -> EnvaultError {
    match err {
        EnvaultError::PipelineTransform(_) if unwrap_sensitive && emitted == 0 => {
            EnvaultError::EnvelopeDecryptionFailed
        }
        other => other,
    }
}

/// Drive a pipeline from an async reader into an async writer.
///
/// Each chunk is read, transformed and fully written before the next read,
/// so a stalled consumer throttles the producer and nothing accumulates
/// beyond one chunk. Returns `(bytes_in, bytes_out)`.
pub async fn pump<R, W>(mut pipeline: Pipeline, mut reader: R, writer: &mut W) -> EnvaultResult<(u64, u64)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes_in = 0u64;
    let mut bytes_out = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        bytes_in += n as u64;
        let out = pipeline.update(&buf[..n])?;
        if !out.is_empty() {
            writer.write_all(&out).await?;
            bytes_out += out.len() as u64;
        }
    }

    let tail = pipeline.finish()?;
    if !tail.is_empty() {
        writer.write_all(&tail).await?;
        bytes_out += tail.len() as u64;
    }
    writer.flush().await?;

    Ok((bytes_in, bytes_out))
}
