//! Validated encryption materials: master key plus its description

use envault_core::{EnvaultError, EnvaultResult};

use crate::keys::MasterKey;

/// The validated pair of master key and materials description.
///
/// The description must be a well-formed JSON document; its content is
/// stored verbatim and never interpreted here. It travels in every
/// envelope as advisory metadata.
#[derive(Debug)]
pub struct Materials {
    key: MasterKey,
    description: String,
}

impl Materials {
    pub fn new(key: Vec<u8>, description: &str) -> EnvaultResult<Self> {
        let key = MasterKey::new(key)?;
        let description = validate_desc(description)?;
        Ok(Self { key, description })
    }

    pub fn key(&self) -> &MasterKey {
        &self.key
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Any well-formed JSON document is accepted, including `{}`.
fn validate_desc(description: &str) -> EnvaultResult<String> {
    match serde_json::from_str::<serde_json::Value>(description) {
        Ok(_) => Ok(description.to_string()),
        Err(e) => Err(EnvaultError::InvalidDescription(e)),
    }
}
