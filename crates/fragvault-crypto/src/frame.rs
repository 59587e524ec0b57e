//! Framed AES-GCM encryption for fragment bytes.
//!
//! Frame format: `<version>:<hex(nonce || ciphertext || tag)>`
//!
//! The key version travels inside the frame so a fragment sealed before a
//! rotation stays decryptable afterwards; the decoder resolves whatever
//! version the frame names against the ring. The hex-plus-prefix form
//! keeps frames text-safe inside descriptors.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use rand::RngCore;

use fragvault_core::{VaultError, VaultResult};

use crate::keyring::KeyManager;
use crate::{KEY_LENGTHS, NONCE_SIZE, TAG_SIZE};

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

/// Encrypt `plaintext` under `key`, framing the result with `version`.
///
/// A fresh nonce is drawn per call, so sealing the same plaintext twice
/// yields different frames.
pub fn seal(plaintext: &[u8], version: &str, key: &[u8]) -> VaultResult<String> {
    if !KEY_LENGTHS.contains(&key.len()) {
        return Err(VaultError::InvalidKeyLength { len: key.len() });
    }

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .encrypt(nonce, plaintext),
        24 => Aes192Gcm::new_from_slice(key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .encrypt(nonce, plaintext),
        _ => Aes256Gcm::new_from_slice(key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .encrypt(nonce, plaintext),
    }
    .map_err(|_| VaultError::Internal(anyhow::anyhow!("fragment encryption failed")))?;

    let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    raw.extend_from_slice(&nonce_bytes);
    raw.extend_from_slice(&ciphertext);
    Ok(format!("{version}:{}", hex::encode(raw)))
}

/// Decrypt a frame produced by [`seal`], resolving the key by the version
/// named in the frame.
pub fn open(framed: &str, keys: &KeyManager) -> VaultResult<Vec<u8>> {
    let (version, payload) = framed.split_once(':').ok_or_else(|| VaultError::MalformedFrame {
        reason: "missing version separator".into(),
    })?;

    let key = keys.get(version)?;

    let raw = hex::decode(payload).map_err(|_| VaultError::MalformedFrame {
        reason: "payload is not hex".into(),
    })?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::MalformedFrame {
            reason: format!(
                "payload too short: {} bytes (minimum {})",
                raw.len(),
                NONCE_SIZE + TAG_SIZE
            ),
        });
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = match key.len() {
        16 => Aes128Gcm::new_from_slice(&key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .decrypt(nonce, ciphertext),
        24 => Aes192Gcm::new_from_slice(&key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .decrypt(nonce, ciphertext),
        32 => Aes256Gcm::new_from_slice(&key)
            .map_err(|_| VaultError::InvalidKeyLength { len: key.len() })?
            .decrypt(nonce, ciphertext),
        len => return Err(VaultError::InvalidKeyLength { len }),
    }
    .map_err(|_| VaultError::AuthenticationFailed)?;

    Ok(plaintext)
}
