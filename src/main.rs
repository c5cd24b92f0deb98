use kronos_serve::KronosError;
use kronos_serve::config::fetch_config;
use kronos_serve::forecast::build_forecaster;
use kronos_serve::service::{AppState, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), KronosError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app_config = fetch_config()?;
    let forecaster = build_forecaster(&app_config.model).await?;
    let state = AppState::new(forecaster, app_config.prediction);
    let app = router(state);

    let addr = app_config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, model = %app_config.model.variant, "Kronos service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Kronos service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, gracefully stopping");
}
