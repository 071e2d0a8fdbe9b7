//! Data-key wrapping under the master key
//!
//! Wrap format: AES-ECB with PKCS#7 padding, no IV, matching the envelope
//! wire format (a 32-byte data key wraps to 48 bytes). ECB is tolerable
//! here only because the plaintext is a single fresh random key; it must
//! never be used for bulk data. The wrap carries no authentication tag, so
//! unwrapping with the wrong master key yields garbage silently and is
//! caught downstream.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use zeroize::Zeroize;

use envault_core::envelope::ENVELOPE_KEY;
use envault_core::{EnvaultError, EnvaultResult};

use crate::keys::{DataKey, KeyBytes, MasterKey};
use crate::{BLOCK_SIZE, DATA_KEY_SIZE};

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes192EcbEnc = ecb::Encryptor<aes::Aes192>;
type Aes256EcbEnc = ecb::Encryptor<aes::Aes256>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;
type Aes192EcbDec = ecb::Decryptor<aes::Aes192>;
type Aes256EcbDec = ecb::Decryptor<aes::Aes256>;

/// Encrypt a one-time data key under the master key.
pub fn wrap_data_key(master: &MasterKey, data_key: &DataKey) -> Vec<u8> {
    let pt = data_key.as_bytes().as_slice();
    match &master.0 {
        KeyBytes::Aes128(k) => Aes128EcbEnc::new(k.into()).encrypt_padded_vec_mut::<Pkcs7>(pt),
        KeyBytes::Aes192(k) => Aes192EcbEnc::new(k.into()).encrypt_padded_vec_mut::<Pkcs7>(pt),
        KeyBytes::Aes256(k) => Aes256EcbEnc::new(k.into()).encrypt_padded_vec_mut::<Pkcs7>(pt),
    }
}

/// Decrypt a wrapped data key with the master key.
///
/// A wrapped value whose length is not a whole number of cipher blocks is
/// malformed. A padding failure, or an unwrapped key that is not exactly
/// 32 bytes, means the wrap was produced under a different master key (or
/// corrupted) and surfaces as `EnvelopeDecryptionFailed`.
pub fn unwrap_data_key(master: &MasterKey, wrapped: &[u8]) -> EnvaultResult<DataKey> {
    if wrapped.is_empty() || wrapped.len() % BLOCK_SIZE != 0 {
        return Err(EnvaultError::EnvelopeMalformed {
            field: ENVELOPE_KEY,
        });
    }

    let mut plaintext = match &master.0 {
        KeyBytes::Aes128(k) => Aes128EcbDec::new(k.into()).decrypt_padded_vec_mut::<Pkcs7>(wrapped),
        KeyBytes::Aes192(k) => Aes192EcbDec::new(k.into()).decrypt_padded_vec_mut::<Pkcs7>(wrapped),
        KeyBytes::Aes256(k) => Aes256EcbDec::new(k.into()).decrypt_padded_vec_mut::<Pkcs7>(wrapped),
    }
    .map_err(|_| EnvaultError::EnvelopeDecryptionFailed)?;

    if plaintext.len() != DATA_KEY_SIZE {
        plaintext.zeroize();
        return Err(EnvaultError::EnvelopeDecryptionFailed);
    }

    let mut key_bytes = [0u8; DATA_KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(DataKey::from_bytes(key_bytes))
}
