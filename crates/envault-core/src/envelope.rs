//! The metadata envelope stored alongside every encrypted object.
//!
//! Wire format is a string-keyed metadata map with exactly three entries:
//!
//! | key              | encoding | meaning                                    |
//! |------------------|----------|--------------------------------------------|
//! | `x-amz-key`      | base64   | master-key-ECB-encrypted 32-byte data key  |
//! | `x-amz-iv`       | base64   | 16-byte CBC IV (not secret)                |
//! | `x-amz-matdesc`  | UTF-8    | JSON materials description, opaque here    |

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;

use crate::error::{EnvaultError, EnvaultResult};

pub const ENVELOPE_KEY: &str = "x-amz-key";
pub const ENVELOPE_IV: &str = "x-amz-iv";
pub const ENVELOPE_MATDESC: &str = "x-amz-matdesc";

/// Per-object envelope: the wrapped data key, the IV, and the materials
/// description. Carries no plaintext key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Master-key-encrypted data key
    pub wrapped_key: Vec<u8>,
    /// CBC initialization vector
    pub iv: Vec<u8>,
    /// Materials description, stored verbatim
    pub matdesc: String,
}

impl Envelope {
    /// Render as an object-metadata map, base64-encoding the binary fields.
    pub fn to_metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            (ENVELOPE_KEY.to_string(), BASE64.encode(&self.wrapped_key)),
            (ENVELOPE_IV.to_string(), BASE64.encode(&self.iv)),
            (ENVELOPE_MATDESC.to_string(), self.matdesc.clone()),
        ])
    }

    /// Parse an envelope back out of an object-metadata map.
    ///
    /// Fails with `EnvelopeMalformed` naming the first field that is
    /// missing or does not base64-decode; no stream is built past this
    /// point.
    pub fn from_metadata(meta: &HashMap<String, String>) -> EnvaultResult<Self> {
        let wrapped_key = decode_field(meta, ENVELOPE_KEY)?;
        let iv = decode_field(meta, ENVELOPE_IV)?;
        let matdesc = meta
            .get(ENVELOPE_MATDESC)
            .cloned()
            .ok_or(EnvaultError::EnvelopeMalformed {
                field: ENVELOPE_MATDESC,
            })?;
        Ok(Self {
            wrapped_key,
            iv,
            matdesc,
        })
    }
}

fn decode_field(meta: &HashMap<String, String>, field: &'static str) -> EnvaultResult<Vec<u8>> {
    let raw = meta
        .get(field)
        .ok_or(EnvaultError::EnvelopeMalformed { field })?;
    BASE64
        .decode(raw)
        .map_err(|_| EnvaultError::EnvelopeMalformed { field })
}
