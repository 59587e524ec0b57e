//! fragvault-engine: the sharded storage engine and file catalog
//!
//! Upload pipeline: file → fragment → seal with the active key → local
//! shard copy (best-effort) + remote content-addressed put (authoritative)
//! → ordered fragment records → descriptor in the metadata store.
//!
//! Download pipeline: descriptor → per fragment, remote fetch with local
//! fallback → open frame with the version it names → append in index
//! order → reconstructed file.

pub mod catalog;
pub mod engine;

pub use catalog::FileCatalog;
pub use engine::StorageEngine;
