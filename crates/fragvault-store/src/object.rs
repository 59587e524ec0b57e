//! Content-addressed object store capability.
//!
//! The engine only needs put/get/list over opaque bytes where byte-equal
//! inputs always land at the same address. The OpenDAL implementation
//! keys objects by the BLAKE3 hash of their bytes under a fixed prefix,
//! which makes `put` naturally idempotent.

use async_trait::async_trait;
use opendal::Operator;
use tracing::debug;

use fragvault_core::{VaultError, VaultResult};

/// Abstract content-addressed store the engine consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write opaque bytes; returns a stable content address.
    /// Byte-equal inputs yield the same address.
    async fn put(&self, bytes: &[u8]) -> VaultResult<String>;

    /// Fetch previously stored bytes by address.
    async fn get(&self, address: &str) -> VaultResult<Vec<u8>>;

    /// Enumerate durably held addresses as `(address, kind)` pairs.
    async fn list_pinned(&self) -> VaultResult<Vec<(String, String)>>;
}

/// OpenDAL-backed implementation. Objects live at `<prefix>/<blake3-hex>`.
pub struct OpendalObjectStore {
    op: Operator,
    prefix: String,
}

impl OpendalObjectStore {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into(),
        }
    }

    fn key_for(&self, address: &str) -> String {
        format!("{}/{address}", self.prefix)
    }
}

#[async_trait]
impl ObjectStore for OpendalObjectStore {
    async fn put(&self, bytes: &[u8]) -> VaultResult<String> {
        let address = fragvault_fragment::hash_hex(bytes);
        let key = self.key_for(&address);

        // Content-addressed: identical bytes are already in place.
        if self.op.exists(&key).await.unwrap_or(false) {
            debug!(address = %address, "object already present");
            return Ok(address);
        }

        self.op
            .write(&key, bytes.to_vec())
            .await
            .map_err(|e| VaultError::Internal(anyhow::anyhow!("object put at '{key}': {e}")))?;
        debug!(address = %address, bytes = bytes.len(), "object stored");
        Ok(address)
    }

    async fn get(&self, address: &str) -> VaultResult<Vec<u8>> {
        let key = self.key_for(address);
        match self.op.read(&key).await {
            Ok(buf) => Ok(buf.to_bytes().to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(VaultError::ObjectNotFound {
                address: address.to_string(),
            }),
            Err(e) => Err(VaultError::Internal(anyhow::anyhow!(
                "object get at '{key}': {e}"
            ))),
        }
    }

    async fn list_pinned(&self) -> VaultResult<Vec<(String, String)>> {
        let entries = self
            .op
            .list(&format!("{}/", self.prefix))
            .await
            .map_err(|e| VaultError::Internal(anyhow::anyhow!("object list: {e}")))?;

        let mut out = Vec::new();
        for entry in entries {
            if entry.metadata().mode() == opendal::EntryMode::FILE {
                out.push((entry.name().to_string(), "file".to_string()));
            }
        }
        Ok(out)
    }
}

/// Build an S3 operator for a remote endpoint.
///
/// Path-style addressing is the OpenDAL default and is what SeaweedFS and
/// MinIO expect. No retry layer: the engine surfaces transport failures
/// and leaves retry policy to the caller.
pub fn build_remote_operator(
    endpoint: &str,
    region: &str,
    bucket: &str,
    access_key_id: &str,
    secret_access_key: &str,
) -> VaultResult<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(endpoint)
        .region(region)
        .bucket(bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| VaultError::Internal(anyhow::anyhow!("creating S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    Ok(op)
}
