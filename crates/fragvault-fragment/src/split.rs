//! Fixed-count file splitting.
//!
//! A file of size `S` becomes exactly `N` fragments: the first `N - 1`
//! carry `S / N` bytes each and the last carries the remainder on top.
//! When `S < N` the first `S` fragments carry one byte each and the rest
//! are empty, so the fragment count is stable for every input size.

use std::path::Path;

use tracing::debug;

use fragvault_core::VaultResult;

use crate::hash::hash_hex;

/// Default fragments per file.
pub const DEFAULT_FRAGMENT_COUNT: usize = 5;

/// One plaintext fragment, identified by its content hash.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// BLAKE3 of `data`, 64 hex chars.
    pub fragment_id: String,
    pub data: Vec<u8>,
}

impl Fragment {
    fn new(data: Vec<u8>) -> Self {
        Self {
            fragment_id: hash_hex(&data),
            data,
        }
    }
}

/// Read `path` and split its contents into exactly `count` fragments.
pub fn split_file(path: &Path, count: usize) -> VaultResult<Vec<Fragment>> {
    let data = std::fs::read(path)?;
    let fragments = split_bytes(&data, count);
    debug!(
        path = %path.display(),
        bytes = data.len(),
        fragments = fragments.len(),
        "file split"
    );
    Ok(fragments)
}

/// Split `data` into exactly `count` ordered fragments.
///
/// Bytes are taken sequentially; no reordering, no overlap. `count` must
/// be at least 1 (callers take it from validated configuration).
pub fn split_bytes(data: &[u8], count: usize) -> Vec<Fragment> {
    assert!(count >= 1, "fragment count must be at least 1");
    let size = data.len();

    let mut fragments = Vec::with_capacity(count);
    if size < count {
        // One byte per fragment until the data runs out, empty after.
        for i in 0..count {
            let piece = if i < size { &data[i..i + 1] } else { &[][..] };
            fragments.push(Fragment::new(piece.to_vec()));
        }
        return fragments;
    }

    let base = size / count;
    let mut offset = 0;
    for i in 0..count {
        let len = if i == count - 1 { size - offset } else { base };
        fragments.push(Fragment::new(data[offset..offset + len].to_vec()));
        offset += len;
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sizes(fragments: &[Fragment]) -> Vec<usize> {
        fragments.iter().map(|f| f.data.len()).collect()
    }

    fn concat(fragments: &[Fragment]) -> Vec<u8> {
        fragments.iter().flat_map(|f| f.data.iter().copied()).collect()
    }

    #[test]
    fn even_split_ten_bytes() {
        let frags = split_bytes(b"abcdefghij", 5);
        assert_eq!(sizes(&frags), vec![2, 2, 2, 2, 2]);
        assert_eq!(frags[0].data, b"ab");
        assert_eq!(frags[4].data, b"ij");
    }

    #[test]
    fn remainder_lands_on_last_fragment() {
        let frags = split_bytes(b"abcdefghijk", 5);
        assert_eq!(sizes(&frags), vec![2, 2, 2, 2, 3]);
        assert_eq!(frags[4].data, b"ijk");
    }

    #[test]
    fn small_file_one_byte_per_fragment() {
        let frags = split_bytes(b"abc", 5);
        assert_eq!(sizes(&frags), vec![1, 1, 1, 0, 0]);
        assert_eq!(concat(&frags), b"abc");
    }

    #[test]
    fn empty_input_yields_empty_fragments() {
        let frags = split_bytes(b"", 5);
        assert_eq!(sizes(&frags), vec![0, 0, 0, 0, 0]);
        assert_eq!(concat(&frags), b"");
    }

    #[test]
    fn single_fragment_count() {
        let frags = split_bytes(b"abcdef", 1);
        assert_eq!(sizes(&frags), vec![6]);
    }

    #[test]
    fn fragment_id_is_plaintext_hash() {
        let frags = split_bytes(b"abcdefghij", 5);
        for frag in &frags {
            assert_eq!(frag.fragment_id, hash_hex(&frag.data));
            assert_eq!(frag.fragment_id.len(), 64);
        }
    }

    #[test]
    fn split_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        std::fs::write(&path, b"abcdefghij").unwrap();

        let frags = split_file(&path, 5).unwrap();
        assert_eq!(sizes(&frags), vec![2, 2, 2, 2, 2]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(split_file(&dir.path().join("absent"), 5).is_err());
    }

    proptest! {
        #[test]
        fn concat_reconstructs_input(
            data in proptest::collection::vec(any::<u8>(), 0..=2048),
            count in 1usize..=8,
        ) {
            let frags = split_bytes(&data, count);
            prop_assert_eq!(frags.len(), count);
            prop_assert_eq!(concat(&frags), data.clone());
            let total: usize = frags.iter().map(|f| f.data.len()).sum();
            prop_assert_eq!(total, data.len());
        }

        #[test]
        fn ids_are_stable_across_runs(data in proptest::collection::vec(any::<u8>(), 0..=512)) {
            let a = split_bytes(&data, 5);
            let b = split_bytes(&data, 5);
            let ids_a: Vec<_> = a.iter().map(|f| f.fragment_id.clone()).collect();
            let ids_b: Vec<_> = b.iter().map(|f| f.fragment_id.clone()).collect();
            prop_assert_eq!(ids_a, ids_b);
        }
    }
}
