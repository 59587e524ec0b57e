use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level node configuration (loaded from fragvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address
    pub listen: String,
    /// Bearer token required on every request; unauthenticated when unset
    pub auth_token: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Directory where reconstructed downloads are staged
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the key ring file and local shard copies
    pub data_dir: PathBuf,
    /// Fragments per file
    pub fragment_count: usize,
    /// Upload size ceiling in bytes
    pub max_file_size: u64,
    /// Remote object store (S3-compatible)
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// S3 endpoint; in-process memory store is used when empty
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// SQLite database path
    pub db_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            auth_token: None,
            log_level: "info".into(),
            log_format: "text".into(),
            output_dir: std::env::temp_dir().join("fragvault-out"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.fragvault/storage"),
            fragment_count: 5,
            max_file_size: 524_288_000,
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".into(),
            bucket: "fragvault".into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("~/.fragvault/metadata.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[daemon]
listen = "0.0.0.0:9090"
auth_token = "hunter2"
log_level = "debug"
log_format = "json"

[storage]
data_dir = "/var/lib/fragvault"
fragment_count = 8
max_file_size = 1048576

[storage.remote]
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "shards"
access_key_id = "AK"
secret_access_key = "SK"

[metadata]
db_path = "/var/lib/fragvault/meta.db"
"#;
        let config: NodeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.listen, "0.0.0.0:9090");
        assert_eq!(config.daemon.auth_token.as_deref(), Some("hunter2"));
        assert_eq!(config.daemon.log_format, "json");
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/fragvault"));
        assert_eq!(config.storage.fragment_count, 8);
        assert_eq!(config.storage.max_file_size, 1_048_576);
        assert_eq!(config.storage.remote.endpoint, "https://s3.example.com");
        assert_eq!(config.storage.remote.bucket, "shards");
        assert_eq!(config.metadata.db_path, PathBuf::from("/var/lib/fragvault/meta.db"));
    }

    #[test]
    fn parse_defaults() {
        let config: NodeConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.listen, "127.0.0.1:8080");
        assert!(config.daemon.auth_token.is_none());
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.storage.fragment_count, 5);
        assert_eq!(config.storage.max_file_size, 524_288_000);
        assert!(config.storage.remote.endpoint.is_empty());
        assert_eq!(config.storage.remote.region, "us-east-1");
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[storage]
fragment_count = 3
"#;
        let config: NodeConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.fragment_count, 3);
        // Defaults
        assert_eq!(config.storage.max_file_size, 524_288_000);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn serialize_roundtrip() {
        let config = NodeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.daemon.listen, parsed.daemon.listen);
        assert_eq!(config.storage.fragment_count, parsed.storage.fragment_count);
        assert_eq!(config.metadata.db_path, parsed.metadata.db_path);
    }
}
