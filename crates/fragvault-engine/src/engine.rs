//! Fragment placement and reconstruction.
//!
//! Upload fans fragment work out across tasks bounded by a semaphore but
//! the resulting descriptor list is assembled by fragment index, so the
//! descriptor order always matches the physical order in the source file.
//! Download is strictly sequential: plaintext reaches the output file in
//! ascending index order, and any failure deletes the partial output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fragvault_core::types::FragmentRecord;
use fragvault_core::{VaultError, VaultResult};
use fragvault_crypto::{frame, KeyManager};
use fragvault_fragment::split_file;
use fragvault_store::{LocalShardStore, ObjectStore};

pub struct StorageEngine {
    keys: Arc<KeyManager>,
    remote: Arc<dyn ObjectStore>,
    local: Arc<LocalShardStore>,
    fragment_count: usize,
}

impl StorageEngine {
    /// The engine itself is stateless; all persistent state lives in the
    /// collaborators, so engines may be constructed per request.
    pub fn new(
        keys: Arc<KeyManager>,
        remote: Arc<dyn ObjectStore>,
        local: Arc<LocalShardStore>,
        fragment_count: usize,
    ) -> Self {
        Self {
            keys,
            remote,
            local,
            fragment_count,
        }
    }

    /// Fragment, seal, and place the file at `path`.
    ///
    /// Returns fragment records in source order. A remote put failure
    /// aborts the upload; fragments already placed stay behind as
    /// orphans (they are content-addressed and may be reused), and no
    /// descriptor is recorded by the caller. A local shard failure is
    /// logged and does not abort: the remote copy is authoritative.
    pub async fn upload(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> VaultResult<Vec<FragmentRecord>> {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let fragments = split_file(path, self.fragment_count)?;
        let total = fragments.len();

        let semaphore = Arc::new(Semaphore::new(self.fragment_count));
        let mut tasks: JoinSet<Result<(usize, FragmentRecord), (usize, VaultError)>> =
            JoinSet::new();

        for (index, fragment) in fragments.into_iter().enumerate() {
            let keys = self.keys.clone();
            let remote = self.remote.clone();
            let local = self.local.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| (index, VaultError::Cancelled))?;
                if cancel.is_cancelled() {
                    return Err((index, VaultError::Cancelled));
                }

                let (version, key) = keys.active().map_err(|e| (index, e))?;
                let framed = frame::seal(&fragment.data, &version, &key).map_err(|e| (index, e))?;

                // Best-effort durability hedge; remote put is authoritative.
                if let Err(e) = local.put(&fragment.fragment_id, framed.as_bytes()) {
                    warn!(
                        fragment_id = %fragment.fragment_id,
                        index,
                        "local shard copy failed: {e}"
                    );
                }

                let address = remote.put(framed.as_bytes()).await.map_err(|e| {
                    (
                        index,
                        VaultError::RemotePutFailed {
                            index,
                            reason: e.to_string(),
                        },
                    )
                })?;

                debug!(index, fragment_id = %fragment.fragment_id, address = %address, "fragment placed");
                Ok((
                    index,
                    FragmentRecord {
                        fragment_id: fragment.fragment_id,
                        plaintext_len: fragment.data.len() as u64,
                        ciphertext_address: address,
                        key_version: version,
                    },
                ))
            });
        }

        let mut records: Vec<Option<FragmentRecord>> = (0..total).map(|_| None).collect();
        let mut failures: Vec<(usize, VaultError)> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, record))) => records[index] = Some(record),
                Ok(Err(failure)) => failures.push(failure),
                Err(e) => failures.push((
                    total,
                    VaultError::Internal(anyhow::anyhow!("fragment task failed: {e}")),
                )),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(index, _)| *index);
            let (_, error) = failures.remove(0);
            return Err(error);
        }

        let records: Vec<FragmentRecord> = records.into_iter().flatten().collect();
        debug_assert_eq!(records.len(), total);
        info!(path = %path.display(), fragments = total, "upload placed");
        Ok(records)
    }

    /// Reconstruct a file from its fragment records, in order, into
    /// `output` (created exclusively). On any failure the partial output
    /// is deleted before the error surfaces.
    pub async fn download(
        &self,
        fragments: &[FragmentRecord],
        output: &Path,
        cancel: &CancellationToken,
    ) -> VaultResult<PathBuf> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(output)
            .await?;

        match self.reassemble(fragments, &mut file, cancel).await {
            Ok(()) => {
                file.flush().await?;
                info!(output = %output.display(), fragments = fragments.len(), "download reconstructed");
                Ok(output.to_path_buf())
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(output).await {
                    warn!(output = %output.display(), "partial output cleanup failed: {rm}");
                }
                Err(e)
            }
        }
    }

    async fn reassemble(
        &self,
        fragments: &[FragmentRecord],
        file: &mut tokio::fs::File,
        cancel: &CancellationToken,
    ) -> VaultResult<()> {
        for (index, record) in fragments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }

            let framed = self.fetch_fragment(index, record).await?;
            let framed = String::from_utf8(framed).map_err(|_| VaultError::MalformedFrame {
                reason: format!("fragment {index} frame is not valid UTF-8"),
            })?;

            let plaintext = frame::open(&framed, &self.keys)?;

            // The descriptor names the plaintext hash; a mismatch means the
            // descriptor and the stored frame disagree.
            let digest = fragvault_fragment::hash_hex(&plaintext);
            if digest != record.fragment_id {
                return Err(VaultError::Internal(anyhow::anyhow!(
                    "fragment {index} integrity mismatch: expected {}, got {digest}",
                    record.fragment_id
                )));
            }

            file.write_all(&plaintext).await?;
        }
        Ok(())
    }

    /// Remote first; the local shard copy is the fallback when the remote
    /// fetch fails for any reason.
    async fn fetch_fragment(&self, index: usize, record: &FragmentRecord) -> VaultResult<Vec<u8>> {
        match self.remote.get(&record.ciphertext_address).await {
            Ok(bytes) => Ok(bytes),
            Err(remote_err) => {
                debug!(
                    index,
                    address = %record.ciphertext_address,
                    "remote fetch failed ({remote_err}), trying local shard"
                );
                self.local
                    .get(&record.fragment_id)
                    .map_err(|_| VaultError::FragmentUnavailable { index })
            }
        }
    }
}
