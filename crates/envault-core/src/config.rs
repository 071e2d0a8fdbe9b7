use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EnvaultError, EnvaultResult};

/// Top-level client configuration (loaded from envault.toml).
///
/// The master key itself never lives in a config file; it is handed to the
/// client as bytes at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvaultConfig {
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding encrypted objects
    pub encrypted_bucket: String,
    /// Bucket holding on-demand decrypted copies
    pub decrypted_bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".into(),
            encrypted_bucket: String::new(),
            decrypted_bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            enforce_tls: true,
        }
    }
}

/// Cipher options. Every recognized field is enumerated here and validated
/// once, at client construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Materials description stored verbatim in every envelope
    pub materials_description: String,
    /// Bulk cipher block mode; only CBC is recognized
    pub block_mode: BlockMode,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            materials_description: "{}".into(),
            block_mode: BlockMode::Cbc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    #[default]
    Cbc,
}

impl EnvaultConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> EnvaultResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|e| EnvaultError::Config(format!("parsing {}: {e}", path.display())))?;
        Ok(cfg)
    }
}
