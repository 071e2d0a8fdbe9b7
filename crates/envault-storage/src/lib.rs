//! envault-storage: OpenDAL operators + the encryption client

pub mod client;
pub mod operator;

pub use client::{EncryptionClient, UploadSummary};
pub use operator::build_operator;
