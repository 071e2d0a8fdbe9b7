//! envault-core: shared types for the envault client-side encryption stack

pub mod config;
pub mod envelope;
pub mod error;

pub use envelope::Envelope;
pub use error::{EnvaultError, EnvaultResult};
