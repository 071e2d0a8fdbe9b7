//! Key material: master key, per-object data keys and IVs, key provider

use rand::RngCore;
use zeroize::Zeroize;

use envault_core::{EnvaultError, EnvaultResult};

use crate::materials::Materials;
use crate::{DATA_KEY_SIZE, IV_SIZE};

/// A caller-supplied symmetric master key of 16, 24 or 32 bytes
/// (AES-128/192/256). Only ever used to wrap and unwrap data keys, never
/// applied to bulk data. Zeroized on drop.
///
/// The length is fixed in the type at validation time, so the AES variant
/// dispatch in the wrap/unwrap path is total.
#[derive(Clone)]
pub struct MasterKey(pub(crate) KeyBytes);

#[derive(Clone)]
pub(crate) enum KeyBytes {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl MasterKey {
    /// Validate and take ownership of raw key bytes.
    pub fn new(mut bytes: Vec<u8>) -> EnvaultResult<Self> {
        let key = match bytes.len() {
            16 => {
                let mut k = [0u8; 16];
                k.copy_from_slice(&bytes);
                KeyBytes::Aes128(k)
            }
            24 => {
                let mut k = [0u8; 24];
                k.copy_from_slice(&bytes);
                KeyBytes::Aes192(k)
            }
            32 => {
                let mut k = [0u8; 32];
                k.copy_from_slice(&bytes);
                KeyBytes::Aes256(k)
            }
            len => {
                bytes.zeroize();
                return Err(EnvaultError::InvalidKeyLength { len });
            }
        };
        bytes.zeroize();
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            KeyBytes::Aes128(k) => k,
            KeyBytes::Aes192(k) => k,
            KeyBytes::Aes256(k) => k,
        }
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        match &mut self.0 {
            KeyBytes::Aes128(k) => k.zeroize(),
            KeyBytes::Aes192(k) => k.zeroize(),
            KeyBytes::Aes256(k) => k.zeroize(),
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A one-time 256-bit data key, generated fresh per object and discarded
/// once the wrap step and the cipher construction have consumed it.
/// Zeroized on drop.
pub struct DataKey {
    bytes: [u8; DATA_KEY_SIZE],
}

impl DataKey {
    pub fn from_bytes(bytes: [u8; DATA_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; DATA_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random one-time data key.
pub fn generate_data_key() -> DataKey {
    let mut bytes = [0u8; DATA_KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    DataKey::from_bytes(bytes)
}

/// Generate a random CBC initialization vector.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Owns the validated encryption materials for one client instance.
///
/// This indirection is the seam for alternative key-resolution strategies
/// (e.g. picking among several master keys by materials description)
/// without touching the cipher provider.
#[derive(Debug)]
pub struct KeyProvider {
    materials: Materials,
}

impl KeyProvider {
    /// Build a provider with the default `"{}"` materials description.
    pub fn new(key: Vec<u8>) -> EnvaultResult<Self> {
        Self::with_description(key, "{}")
    }

    pub fn with_description(key: Vec<u8>, description: &str) -> EnvaultResult<Self> {
        Ok(Self {
            materials: Materials::new(key, description)?,
        })
    }

    /// The raw master key.
    pub fn key(&self) -> &MasterKey {
        self.materials.key()
    }

    /// The key/description pair used when building new envelopes.
    pub fn encryption_materials(&self) -> &Materials {
        &self.materials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_keys_distinct() {
        let k1 = generate_data_key();
        let k2 = generate_data_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_ivs_distinct() {
        assert_ne!(generate_iv(), generate_iv(), "random IVs must differ");
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let master = MasterKey::new(vec![7u8; 32]).unwrap();
        let data = generate_data_key();
        assert!(!format!("{master:?}").contains('7'));
        assert!(format!("{master:?}").contains("REDACTED"));
        assert!(format!("{data:?}").contains("REDACTED"));
    }

    #[test]
    fn test_provider_defaults_description() {
        let kp = KeyProvider::new(vec![0u8; 16]).unwrap();
        assert_eq!(kp.encryption_materials().description(), "{}");
        assert_eq!(kp.key().as_bytes().len(), 16);
    }
}
