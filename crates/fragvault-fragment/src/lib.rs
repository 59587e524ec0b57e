//! fragvault-fragment: deterministic fixed-count splitting + content hashing
//!
//! - `split`: cut a file into exactly N ordered plaintext fragments
//! - `hash`: BLAKE3 content identity (fragment ids, file fingerprints)
//!
//! The splitter is a pure producer: it reads the source file and nothing
//! else. Encryption and placement happen downstream.

pub mod hash;
pub mod split;

pub use hash::{hash_bytes, hash_hex};
pub use split::{split_bytes, split_file, Fragment, DEFAULT_FRAGMENT_COUNT};
