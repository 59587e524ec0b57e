//! fragvault-crypto: key-versioned authenticated encryption
//!
//! Two pieces:
//! - `keyring`: the persisted, append-only ring of symmetric keys with one
//!   active version; all fragment encryption pulls its key from here.
//! - `frame`: AES-GCM seal/open with the key version carried in the frame,
//!   so fragments sealed under a rotated-away key stay decryptable.
//!
//! Wire form of a sealed fragment:
//! ```text
//! <version>:<hex(nonce || ciphertext || tag)>
//! ```

pub mod frame;
pub mod keyring;

pub use frame::{open, seal};
pub use keyring::KeyManager;

/// AES-GCM nonce size in bytes (96-bit)
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Accepted key lengths: AES-128, AES-192, AES-256
pub const KEY_LENGTHS: [usize; 3] = [16, 24, 32];
