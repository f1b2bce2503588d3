//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `HostCommand` messages as newline-delimited JSON from stdin, drives
//! the voice assistant, and writes `HostEvent` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.
//!
//! Usage: `sinsay-host [CONFIG_PATH]`

use sinsay_assistant::AssistantConfig;
use sinsay_assistant::host::stdio::run_stdio_bridge;
use sinsay_assistant::store::FileStore;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sinsay_assistant=info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AssistantConfig::default_config_path);

    let config = if config_path.exists() {
        AssistantConfig::from_file(&config_path)
            .map_err(|e| anyhow::anyhow!("cannot load {}: {e}", config_path.display()))?
    } else {
        tracing::info!(path = %config_path.display(), "no config file; using defaults");
        AssistantConfig::default()
    };

    tracing::info!(storage = %config.storage.dir.display(), "sinsay-host starting");
    let store = Arc::new(FileStore::new(config.storage.dir.clone()));

    run_stdio_bridge(config, store).await.map_err(|e| {
        tracing::error!(error = %e, "sinsay-host exited with error");
        anyhow::anyhow!("sinsay-host failed: {e}")
    })?;

    tracing::info!("sinsay-host shut down cleanly");
    Ok(())
}
