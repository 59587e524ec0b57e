//! fragvault-store: persistence capabilities for the storage engine
//!
//! - `object`: the content-addressed `ObjectStore` capability and its
//!   OpenDAL-backed implementation (S3 in deployment, Memory in tests)
//! - `shard`: durable local copies of encrypted fragment bytes
//! - `metadata`: the `MetadataStore` capability and its SQLite
//!   implementation

pub mod metadata;
pub mod object;
pub mod shard;

pub use metadata::{MetadataStore, SqliteMetadataStore};
pub use object::{build_remote_operator, ObjectStore, OpendalObjectStore};
pub use shard::LocalShardStore;
