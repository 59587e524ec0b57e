//! Closed error taxonomy for the storage core.
//!
//! Fragment indexes, key versions, and addresses travel as structured
//! fields so failures can be diagnosed from logs without string parsing.

use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid key length: {len} bytes (must be 16, 24, or 32)")]
    InvalidKeyLength { len: usize },

    #[error("unknown key version '{version}'")]
    UnknownKeyVersion { version: String },

    #[error("authentication failed: ciphertext rejected")]
    AuthenticationFailed,

    #[error("malformed ciphertext frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("object not found at address '{address}'")]
    ObjectNotFound { address: String },

    #[error("remote put failed for fragment {index}: {reason}")]
    RemotePutFailed { index: usize, reason: String },

    #[error("fragment {index} unavailable from both remote and local stores")]
    FragmentUnavailable { index: usize },

    #[error("local shard persist failed: {reason}")]
    LocalPersistFailed { reason: String },

    #[error("metadata conflict: file id '{file_id}' already exists")]
    MetadataConflict { file_id: String },

    #[error("metadata not found for file id '{file_id}'")]
    MetadataNotFound { file_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
