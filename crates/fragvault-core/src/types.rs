use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hex length of an externally visible file identifier.
pub const FILE_ID_LEN: usize = 16;

/// Hex length of a fragment identifier (32-byte content hash).
pub const FRAGMENT_ID_LEN: usize = 64;

/// Maximum length of a user-supplied note, in characters.
pub const MAX_NOTE_LEN: usize = 255;

/// One ordered piece of a file, as persisted in a descriptor.
///
/// The position in the descriptor's fragment list is the reconstruction
/// order; no explicit index is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// Content hash of the plaintext bytes (64 hex chars).
    pub fragment_id: String,
    /// Plaintext byte count.
    pub plaintext_len: u64,
    /// Content address assigned by the remote object store.
    pub ciphertext_address: String,
    /// Key ring version that sealed this fragment.
    pub key_version: String,
}

/// Metadata record binding an external file identifier to its fragments.
///
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Externally visible identifier (16 hex chars, randomly assigned).
    pub file_id: String,
    /// Original basename, informational only.
    pub file_name: String,
    /// Total plaintext byte count.
    pub file_size: u64,
    /// Optional user-supplied annotation.
    pub note: Option<String>,
    /// First 16 hex chars of the hash over the concatenated ciphertext
    /// addresses, in index order. Informational; never used for lookup.
    pub fingerprint: String,
    /// Catalog insertion time.
    pub created_at: DateTime<Utc>,
    /// Ordered fragment list; concatenating the plaintexts reconstructs
    /// the file byte-for-byte.
    pub fragments: Vec<FragmentRecord>,
}

impl FileDescriptor {
    /// Sum of fragment plaintext lengths; equals `file_size` by invariant.
    pub fn fragment_bytes(&self) -> u64 {
        self.fragments.iter().map(|f| f.plaintext_len).sum()
    }
}

/// Check that an identifier is exactly `FILE_ID_LEN` lowercase hex chars.
pub fn is_valid_file_id(id: &str) -> bool {
    id.len() == FILE_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
