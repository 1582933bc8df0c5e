//! Process entry point: loads configuration, boots the engine, and runs
//! until interrupted. Shape grounded on
//! `examples/lvzzzx-chronicle-rs/src/bin/chronicle_feed_binance.rs`
//! (`#[tokio::main]`, `env_logger::init()`, `anyhow::Context` at the
//! top level only — everything below `main` still returns the crate's own
//! `Result`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crosspost::config::Config;
use crosspost::orchestrator::Crossposter;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let (source, messaging) = build_clients(&config)?;

    info!("starting crossposting engine, db={}", config.db_name);
    let engine = Crossposter::start(&config, source, messaging)
        .await
        .context("failed to start engine")?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, draining workers");
    engine.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

/// No real VK/Telegram HTTP client ships in this crate: callers embed this
/// crate as a library and supply their own `SourceClient` /
/// `MessagingClient` implementations. The `test-fakes` feature's in-memory
/// fakes stand in here so `cargo run --features test-fakes` gives a runnable
/// demo against canned data instead of a live network.
#[cfg(feature = "test-fakes")]
fn build_clients(
    _config: &Config,
) -> Result<(Arc<dyn crosspost::source_client::SourceClient>, Arc<dyn crosspost::messaging_client::MessagingClient>)> {
    use crosspost::messaging_client::fakes::FakeMessagingClient;
    use crosspost::source_client::fakes::FakeSourceClient;
    Ok((
        Arc::new(FakeSourceClient::default()),
        Arc::new(FakeMessagingClient::default()),
    ))
}

#[cfg(not(feature = "test-fakes"))]
fn build_clients(
    _config: &Config,
) -> Result<(Arc<dyn crosspost::source_client::SourceClient>, Arc<dyn crosspost::messaging_client::MessagingClient>)> {
    anyhow::bail!(
        "no production SourceClient/MessagingClient is bundled with this crate; \
         embed crosspost as a library and supply your own, or run with \
         `--features test-fakes` for a local demo"
    )
}
