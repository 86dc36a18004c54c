use anyhow::Context;

use ledger_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_observability::init();

    let config = LedgerConfig::from_env().context("failed to load configuration")?;
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on exit)");
    }

    let app = ledger_api::app::build_app(&config)
        .await
        .context("failed to build application")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        default_months = config.warranty.default_months,
        repair_extension_months = config.warranty.repair_extension_months,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
