//! External identifiers and descriptor lifecycle.
//!
//! The catalog validates upload inputs, runs the engine, derives the
//! file-level fingerprint, assigns the externally visible file id, and
//! persists the descriptor. Downloads go the other way: resolve the
//! descriptor, hand its fragment list to the engine, return the path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fragvault_core::types::{is_valid_file_id, FileDescriptor, FILE_ID_LEN, MAX_NOTE_LEN};
use fragvault_core::{VaultError, VaultResult};
use fragvault_store::MetadataStore;

use crate::engine::StorageEngine;

/// Attempts at drawing an unused random file id before giving up. The
/// 16-hex space makes a second attempt already vanishingly unlikely.
const FILE_ID_ATTEMPTS: usize = 4;

pub struct FileCatalog {
    engine: StorageEngine,
    metadata: Arc<dyn MetadataStore>,
    max_file_size: u64,
    output_dir: PathBuf,
}

impl FileCatalog {
    pub fn new(
        engine: StorageEngine,
        metadata: Arc<dyn MetadataStore>,
        max_file_size: u64,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            metadata,
            max_file_size,
            output_dir: output_dir.into(),
        }
    }

    /// Upload the file at `path` and record its descriptor.
    ///
    /// Oversize files and over-long notes are refused before any
    /// fragment work happens.
    pub async fn upload(
        &self,
        path: &Path,
        note: Option<String>,
        cancel: &CancellationToken,
    ) -> VaultResult<FileDescriptor> {
        let meta = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::InvalidInput(format!("file not found: {}", path.display()))
            } else {
                e.into()
            }
        })?;
        if !meta.is_file() {
            return Err(VaultError::InvalidInput(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        if meta.len() > self.max_file_size {
            return Err(VaultError::InvalidInput(format!(
                "file too large: {} bytes (maximum {})",
                meta.len(),
                self.max_file_size
            )));
        }
        if let Some(ref note) = note {
            if note.chars().count() > MAX_NOTE_LEN {
                return Err(VaultError::InvalidInput(format!(
                    "note too long: {} characters (maximum {MAX_NOTE_LEN})",
                    note.chars().count()
                )));
            }
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                VaultError::InvalidInput(format!("path has no usable name: {}", path.display()))
            })?;

        let fragments = self.engine.upload(path, cancel).await?;
        let fingerprint = fingerprint(&fragments);

        // The external identifier is random rather than the fingerprint:
        // two uploads of the same bytes stay unlinkable. Collisions are
        // detected by the insert and retried with a fresh draw.
        let mut descriptor = FileDescriptor {
            file_id: random_file_id(),
            file_name,
            file_size: meta.len(),
            note,
            fingerprint,
            created_at: Utc::now(),
            fragments,
        };

        let mut attempts = 0;
        loop {
            match self.metadata.insert(&descriptor).await {
                Ok(()) => {
                    info!(
                        file_id = %descriptor.file_id,
                        file_name = %descriptor.file_name,
                        size = descriptor.file_size,
                        fragments = descriptor.fragments.len(),
                        "file cataloged"
                    );
                    return Ok(descriptor);
                }
                Err(VaultError::MetadataConflict { file_id }) if attempts + 1 < FILE_ID_ATTEMPTS => {
                    attempts += 1;
                    warn!(%file_id, "file id collision, drawing a new one");
                    descriptor.file_id = random_file_id();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reconstruct the file named by `file_id` and return its path.
    ///
    /// The output lands in a fresh per-request directory under the
    /// catalog's output dir; the caller owns cleanup once it has
    /// consumed the file.
    pub async fn download(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> VaultResult<PathBuf> {
        if !is_valid_file_id(file_id) {
            return Err(VaultError::InvalidInput(format!(
                "file id must be {FILE_ID_LEN} lowercase hex characters"
            )));
        }

        let descriptor = self.metadata.get(file_id).await?;

        let staging = self.output_dir.join(random_file_id());
        tokio::fs::create_dir_all(&staging).await?;
        let output = staging.join(&descriptor.file_name);

        self.engine
            .download(&descriptor.fragments, &output, cancel)
            .await
    }

    /// All descriptors in the metadata store.
    pub async fn list(&self) -> VaultResult<Vec<FileDescriptor>> {
        self.metadata.list().await
    }

    /// Descriptor lookup without reconstruction.
    pub async fn describe(&self, file_id: &str) -> VaultResult<FileDescriptor> {
        if !is_valid_file_id(file_id) {
            return Err(VaultError::InvalidInput(format!(
                "file id must be {FILE_ID_LEN} lowercase hex characters"
            )));
        }
        self.metadata.get(file_id).await
    }
}

/// File-level fingerprint: hash of the ciphertext addresses concatenated
/// in index order, truncated to 16 hex chars. Informational only.
fn fingerprint(fragments: &[fragvault_core::types::FragmentRecord]) -> String {
    let concatenated: String = fragments
        .iter()
        .map(|f| f.ciphertext_address.as_str())
        .collect();
    fragvault_fragment::hash_hex(concatenated.as_bytes())[..FILE_ID_LEN].to_string()
}

/// Random identifier from the lowercase hex alphabet, 16 chars.
fn random_file_id() -> String {
    let mut raw = [0u8; FILE_ID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragvault_core::types::FragmentRecord;

    #[test]
    fn random_file_id_shape() {
        let id = random_file_id();
        assert!(is_valid_file_id(&id), "id {id:?} must be 16 lowercase hex");
        assert_ne!(random_file_id(), random_file_id());
    }

    #[test]
    fn fingerprint_depends_on_address_order() {
        let rec = |addr: &str| FragmentRecord {
            fragment_id: "ee".repeat(32),
            plaintext_len: 1,
            ciphertext_address: addr.to_string(),
            key_version: "v1".into(),
        };

        let forward = fingerprint(&[rec("alpha"), rec("beta")]);
        let reversed = fingerprint(&[rec("beta"), rec("alpha")]);

        assert_eq!(forward.len(), FILE_ID_LEN);
        assert_ne!(forward, reversed);
    }
}
