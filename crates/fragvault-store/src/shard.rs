//! Durable local copies of encrypted fragment bytes.
//!
//! One `<fragment_id>.bin` file per fragment under the node's storage
//! directory. Only framed ciphertext is ever written here; the plaintext
//! never touches this directory. The local copy is a durability hedge:
//! it serves the node's own fragments while disconnected and is the
//! fallback path during download.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use fragvault_core::{VaultError, VaultResult};

const SHARD_EXT: &str = "bin";

pub struct LocalShardStore {
    dir: PathBuf,
}

impl LocalShardStore {
    /// Open the store, creating the directory if missing.
    pub fn open(dir: impl Into<PathBuf>) -> VaultResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn shard_path(&self, fragment_id: &str) -> PathBuf {
        self.dir.join(format!("{fragment_id}.{SHARD_EXT}"))
    }

    /// Write the framed bytes for a fragment, mode 0644.
    ///
    /// Written to a unique temp file and renamed into place, so
    /// concurrent writers for the same id (byte-equal plaintexts seal to
    /// different frames) land whole: last writer wins, never a torn file.
    pub fn put(&self, fragment_id: &str, framed: &[u8]) -> VaultResult<()> {
        static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

        let path = self.shard_path(fragment_id);
        let tmp = self.dir.join(format!(
            ".{fragment_id}.{}.tmp",
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let write = |tmp: &Path| -> std::io::Result<()> {
            std::fs::write(tmp, framed)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(tmp, std::fs::Permissions::from_mode(0o644))?;
            }
            std::fs::rename(tmp, &path)
        };

        write(&tmp).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            VaultError::LocalPersistFailed {
                reason: format!("writing {}: {e}", path.display()),
            }
        })?;

        debug!(fragment_id, bytes = framed.len(), "local shard stored");
        Ok(())
    }

    /// Read the framed bytes for a fragment.
    pub fn get(&self, fragment_id: &str) -> VaultResult<Vec<u8>> {
        let path = self.shard_path(fragment_id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::ObjectNotFound {
                    address: fragment_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of shard files currently present.
    pub fn count(&self) -> VaultResult<usize> {
        Ok(self.list()?.len())
    }

    /// Fragment ids present locally, extension stripped.
    pub fn list(&self) -> VaultResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(&format!(".{SHARD_EXT}")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
