//! Node bootstrap: storage directories, key ring, stores, engine, and
//! the HTTP ingress with graceful shutdown.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use fragvault_core::config::NodeConfig;
use fragvault_crypto::KeyManager;
use fragvault_engine::{FileCatalog, StorageEngine};
use fragvault_store::{
    build_remote_operator, LocalShardStore, OpendalObjectStore, SqliteMetadataStore,
};

use crate::http;

const FRAGMENT_PREFIX: &str = "fragments";

pub async fn run(config: NodeConfig) -> Result<()> {
    info!("daemon starting");

    if config.storage.fragment_count == 0 {
        anyhow::bail!("storage.fragment_count must be at least 1");
    }

    // Local state: shard directory, key ring, metadata database
    let data_dir = expand_tilde(&config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating storage directory {}", data_dir.display()))?;
    info!(dir = %data_dir.display(), "storage directory initialized");

    let keys = Arc::new(KeyManager::open(data_dir.join("keys.json"))?);
    let shards = Arc::new(LocalShardStore::open(&data_dir)?);
    info!(shards = shards.count()?, "local shard store opened");

    let db_path = expand_tilde(&config.metadata.db_path);
    let metadata = Arc::new(SqliteMetadataStore::open(&db_path)?);

    // Remote object store
    let remote_cfg = &config.storage.remote;
    let operator = if remote_cfg.endpoint.is_empty() {
        warn!("no remote endpoint configured — using in-process memory store (non-durable)");
        opendal::Operator::new(opendal::services::Memory::default())
            .context("creating memory operator")?
            .finish()
    } else {
        info!(endpoint = %remote_cfg.endpoint, bucket = %remote_cfg.bucket, "remote object store configured");
        build_remote_operator(
            &remote_cfg.endpoint,
            &remote_cfg.region,
            &remote_cfg.bucket,
            &remote_cfg.access_key_id,
            &remote_cfg.secret_access_key,
        )?
    };
    let remote = Arc::new(OpendalObjectStore::new(operator, FRAGMENT_PREFIX));

    // Engine + catalog
    let engine = StorageEngine::new(
        keys.clone(),
        remote,
        shards.clone(),
        config.storage.fragment_count,
    );
    let output_dir = expand_tilde(&config.daemon.output_dir);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    let catalog = Arc::new(FileCatalog::new(
        engine,
        metadata,
        config.storage.max_file_size,
        &output_dir,
    ));

    // HTTP ingress
    if config.daemon.auth_token.is_none() {
        warn!("no auth token configured — requests are unauthenticated");
    }
    let state = http::AppState::new(
        catalog,
        shards,
        keys,
        config.daemon.auth_token.clone(),
        config.storage.max_file_size,
    );
    let router = http::build_router(state, config.storage.max_file_size);

    let listener = tokio::net::TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("binding {}", config.daemon.listen))?;
    info!(listen = %config.daemon.listen, "HTTP: listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler failed: {e}");
        return;
    }
    info!("shutdown signal received");
}

/// Expand a leading `~/` against $HOME so the default config works out
/// of the box.
fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
