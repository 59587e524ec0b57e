//! fragvaultd: encrypted fragment storage node
//!
//! Usage:
//!   fragvaultd [--config /etc/fragvault/config.toml]
//!
//! Accepts uploads over HTTP, splits each file into encrypted fragments,
//! places them on the remote object store with durable local copies, and
//! reconstructs files on demand.

mod daemon;
mod http;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fragvaultd", version, about = "fragvault storage node daemon")]
struct Cli {
    /// Path to fragvault.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "FRAGVAULT_CONFIG",
        default_value = "/etc/fragvault/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FRAGVAULT_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "FRAGVAULT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "fragvaultd starting"
    );

    let config = load_config(&cli.config).await?;
    daemon::run(config).await
}

async fn load_config(path: &PathBuf) -> Result<fragvault_core::config::NodeConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(fragvault_core::config::NodeConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
