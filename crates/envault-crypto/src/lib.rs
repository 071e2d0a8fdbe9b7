//! envault-crypto: client-side envelope encryption for blob-store objects
//!
//! Architecture: compress-then-encrypt with a one-time data key per object
//!
//! Encrypt pipeline: plaintext → gzip → AES-256-CBC → ciphertext upload
//! Decrypt pipeline: ciphertext → AES-256-CBC → gunzip → plaintext
//!
//! Key hierarchy:
//! ```text
//! Master Key (16/24/32 bytes, caller-supplied, AES-128/192/256)
//!   └── Data Key (per-object, 32-byte random)
//!         wrapped under the master key with AES-ECB + PKCS#7 and carried
//!         base64-encoded in the object-metadata envelope, next to the
//!         CBC IV and the materials description
//! ```
//!
//! The scheme provides confidentiality only: the wrap carries no IV and no
//! authentication tag, and the bulk cipher is unauthenticated CBC. This is
//! the documented wire behavior; it is not upgraded to AEAD here.

pub mod cipher;
pub mod keys;
pub mod materials;
pub mod pipeline;
pub mod wrap;

pub use cipher::{CipherProvider, EncryptionCipher};
pub use keys::{generate_data_key, generate_iv, DataKey, KeyProvider, MasterKey};
pub use materials::Materials;
pub use pipeline::{pump, Pipeline, Transform};
pub use wrap::{unwrap_data_key, wrap_data_key};

/// Size of a per-object data key in bytes (AES-256)
pub const DATA_KEY_SIZE: usize = 32;

/// Size of a CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
