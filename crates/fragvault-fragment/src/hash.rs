//! BLAKE3 content hashing.
//!
//! The 32-byte digest identifies plaintext fragments (64 hex chars at the
//! boundary) and feeds the file-level fingerprint.

/// Hash a byte slice.
pub fn hash_bytes(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// Hash a byte slice and format as lowercase hex (64 chars).
pub fn hash_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hex_form_is_64_chars() {
        assert_eq!(hash_hex(b"").len(), 64);
        assert_eq!(hash_hex(b"fragment").len(), 64);
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(hash_hex(b"foo"), hash_hex(b"bar"));
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            prop_assert_eq!(hash_bytes(&data), hash_bytes(&data));
            prop_assert_eq!(hash_hex(&data), hash_hex(&data));
        }
    }
}
