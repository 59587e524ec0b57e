//! Versioned key ring with atomic on-disk persistence.
//!
//! One JSON record holds every key version the node has ever had plus the
//! active version label. Versions are append-only: once a version has
//! sealed a fragment it must stay resolvable forever, so rotation never
//! removes or overwrites an entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use fragvault_core::{VaultError, VaultResult};

use crate::KEY_LENGTHS;

/// Version label generated on first start.
pub const INITIAL_VERSION: &str = "v1";

/// On-disk form of the ring. Keys are hex-encoded.
#[derive(Debug, Serialize, Deserialize)]
struct KeyRingRecord {
    active: String,
    keys: BTreeMap<String, String>,
}

/// Persists and supplies versioned symmetric keys.
///
/// All operations serialize through one mutex; writes replace the record
/// atomically (write-to-temp + rename).
pub struct KeyManager {
    path: PathBuf,
    ring: Mutex<KeyRingRecord>,
}

impl KeyManager {
    /// Load the ring from `path`, or create it with a fresh 32-byte key
    /// labeled `v1` if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        if path.exists() {
            let data = std::fs::read(&path)?;
            let ring: KeyRingRecord = serde_json::from_slice(&data).map_err(|e| {
                VaultError::Internal(anyhow::anyhow!(
                    "key ring file {} is corrupt: {e}",
                    path.display()
                ))
            })?;
            if !ring.keys.contains_key(&ring.active) {
                return Err(VaultError::UnknownKeyVersion {
                    version: ring.active,
                });
            }
            info!(path = %path.display(), active = %ring.active, "key ring loaded");
            return Ok(Self {
                path,
                ring: Mutex::new(ring),
            });
        }

        let mut key = Zeroizing::new(vec![0u8; 32]);
        rand::thread_rng().fill_bytes(&mut key);
        let mut keys = BTreeMap::new();
        keys.insert(INITIAL_VERSION.to_string(), hex::encode(&*key));
        let ring = KeyRingRecord {
            active: INITIAL_VERSION.to_string(),
            keys,
        };
        save_record(&path, &ring)?;
        info!(path = %path.display(), "key ring created with active version 'v1'");
        Ok(Self {
            path,
            ring: Mutex::new(ring),
        })
    }

    /// Current active version and its raw key bytes.
    pub fn active(&self) -> VaultResult<(String, Zeroizing<Vec<u8>>)> {
        let ring = self.lock()?;
        let key = decode_key(&ring.keys, &ring.active)?;
        Ok((ring.active.clone(), key))
    }

    /// Raw key bytes for any version the ring has ever held.
    pub fn get(&self, version: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
        let ring = self.lock()?;
        decode_key(&ring.keys, version)
    }

    /// Add `key` under `version`, make it active, and persist durably.
    ///
    /// Existing versions are append-only: re-rotating to a known label is
    /// only accepted when the bytes are identical (re-activation).
    pub fn rotate(&self, version: &str, key: &[u8]) -> VaultResult<()> {
        if version.is_empty() || version.contains(':') {
            return Err(VaultError::InvalidInput(format!(
                "key version label '{version}' must be non-empty and must not contain ':'"
            )));
        }
        if !KEY_LENGTHS.contains(&key.len()) {
            return Err(VaultError::InvalidKeyLength { len: key.len() });
        }

        let mut ring = self.lock()?;
        let encoded = hex::encode(key);
        if let Some(existing) = ring.keys.get(version) {
            if *existing != encoded {
                return Err(VaultError::InvalidInput(format!(
                    "key version '{version}' already exists with different bytes"
                )));
            }
        }
        ring.keys.insert(version.to_string(), encoded);
        ring.active = version.to_string();
        save_record(&self.path, &ring)?;
        info!(version, "key ring rotated");
        Ok(())
    }

    /// All version labels, oldest-label first.
    pub fn versions(&self) -> VaultResult<Vec<String>> {
        let ring = self.lock()?;
        Ok(ring.keys.keys().cloned().collect())
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, KeyRingRecord>> {
        self.ring
            .lock()
            .map_err(|_| VaultError::Internal(anyhow::anyhow!("key ring lock poisoned")))
    }
}

fn decode_key(keys: &BTreeMap<String, String>, version: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
    let encoded = keys.get(version).ok_or_else(|| VaultError::UnknownKeyVersion {
        version: version.to_string(),
    })?;
    let raw = hex::decode(encoded).map_err(|e| {
        VaultError::Internal(anyhow::anyhow!("key for version '{version}' is not hex: {e}"))
    })?;
    Ok(Zeroizing::new(raw))
}

/// Atomic replace: write to a temp file next to the target, then rename,
/// so readers never observe a partial record.
fn save_record(path: &Path, ring: &KeyRingRecord) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(ring)
        .map_err(|e| VaultError::Internal(anyhow::anyhow!("key ring serialization: {e}")))?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ring_generates_v1() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();

        let (version, key) = km.active().unwrap();
        assert_eq!(version, "v1");
        assert_eq!(key.len(), 32);
        assert!(dir.path().join("keys.json").exists());
    }

    #[test]
    fn ring_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let first = {
            let km = KeyManager::open(&path).unwrap();
            km.active().unwrap().1
        };
        let km = KeyManager::open(&path).unwrap();
        let (version, key) = km.active().unwrap();

        assert_eq!(version, "v1");
        assert_eq!(*key, *first);
    }

    #[test]
    fn rotate_sets_active_and_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();
        let v1_key = km.active().unwrap().1;

        km.rotate("v2", &[7u8; 16]).unwrap();

        let (version, key) = km.active().unwrap();
        assert_eq!(version, "v2");
        assert_eq!(key.len(), 16);
        // v1 must stay retrievable for old ciphertexts
        assert_eq!(*km.get("v1").unwrap(), *v1_key);
        assert_eq!(km.versions().unwrap(), vec!["v1", "v2"]);
    }

    #[test]
    fn rotate_rejects_bad_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();

        for len in [0usize, 8, 17, 31, 33, 64] {
            let err = km.rotate("v2", &vec![0u8; len]).unwrap_err();
            assert!(matches!(err, VaultError::InvalidKeyLength { len: l } if l == len));
        }
        // All three AES sizes accepted
        km.rotate("k16", &[1u8; 16]).unwrap();
        km.rotate("k24", &[2u8; 24]).unwrap();
        km.rotate("k32", &[3u8; 32]).unwrap();
    }

    #[test]
    fn rotate_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();
        km.rotate("v2", &[7u8; 16]).unwrap();

        // Different bytes under an existing label: refused
        let err = km.rotate("v2", &[8u8; 16]).unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));

        // Identical bytes: re-activation is fine
        km.rotate("v3", &[9u8; 32]).unwrap();
        km.rotate("v2", &[7u8; 16]).unwrap();
        assert_eq!(km.active().unwrap().0, "v2");
    }

    #[test]
    fn rotate_rejects_separator_in_label() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();

        assert!(matches!(
            km.rotate("v:2", &[0u8; 32]).unwrap_err(),
            VaultError::InvalidInput(_)
        ));
        assert!(matches!(
            km.rotate("", &[0u8; 32]).unwrap_err(),
            VaultError::InvalidInput(_)
        ));
    }

    #[test]
    fn unknown_version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let km = KeyManager::open(dir.path().join("keys.json")).unwrap();

        let err = km.get("v99").unwrap_err();
        assert!(matches!(err, VaultError::UnknownKeyVersion { version } if version == "v99"));
    }

    #[test]
    fn rotation_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        {
            let km = KeyManager::open(&path).unwrap();
            km.rotate("v2", &[5u8; 24]).unwrap();
        }
        let km = KeyManager::open(&path).unwrap();
        assert_eq!(km.active().unwrap().0, "v2");
        assert_eq!(km.get("v2").unwrap().len(), 24);
        // No temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }
}
