//! Application entrypoint and state wiring.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mailchain::config::Config;
use mailchain::service::{spawn_auto_sealer, LedgerService};
use mailchain::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 0) config; an unusable difficulty stops startup here
    let config = Config::parse();
    let difficulty = config.difficulty()?;

    // 1) ledger with its genesis block
    let ledger = LedgerService::new(difficulty);
    info!(
        difficulty = %ledger.difficulty(),
        blocks = ledger.chain_len(),
        "ledger ready with genesis block"
    );

    // 2) background sealing of anything left pending
    if let Some(period) = config.seal_interval() {
        spawn_auto_sealer(ledger.clone(), period);
        info!(period_secs = period.as_secs(), "auto-sealer started");
    }

    // 3) router
    let app = mailchain::app(AppState::new(ledger));

    // 4) serve
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
