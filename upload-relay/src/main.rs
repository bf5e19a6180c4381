use service_core::observability::init_tracing;
use upload_relay::config::RelayConfig;
use upload_relay::services::init_metrics;
use upload_relay::startup::Application;
use upload_relay::SERVICE_NAME;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        SERVICE_NAME,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    // Must run before any metric is recorded.
    init_metrics()?;

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start {}: {}", SERVICE_NAME, e);
        anyhow::anyhow!("Startup error: {}", e)
    })?;

    app.run_until_stopped().await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    tracing::info!("Server stopped");
    Ok(())
}
